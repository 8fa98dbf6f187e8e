// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	fmt::{Display, Formatter},
	str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::CollectionError;

/// A physical backend of a dual collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
	Document,
	Relational,
}

impl Backend {
	pub fn as_str(&self) -> &'static str {
		match self {
			Backend::Document => "document",
			Backend::Relational => "relational",
		}
	}
}

impl Display for Backend {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Where reads go: exactly one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadTarget {
	#[default]
	Document,
	Relational,
}

impl ReadTarget {
	pub fn backend(&self) -> Backend {
		match self {
			ReadTarget::Document => Backend::Document,
			ReadTarget::Relational => Backend::Relational,
		}
	}

	pub fn as_str(&self) -> &'static str {
		self.backend().as_str()
	}
}

/// Where writes go: one backend or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteTarget {
	#[default]
	Document,
	Relational,
	Both,
}

impl WriteTarget {
	/// The backend whose result is returned, then the backends mirrored to.
	pub fn backends(&self) -> (Backend, &'static [Backend]) {
		match self {
			WriteTarget::Document => (Backend::Document, &[]),
			WriteTarget::Relational => (Backend::Relational, &[]),
			WriteTarget::Both => (Backend::Document, &[Backend::Relational]),
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			WriteTarget::Document => "document",
			WriteTarget::Relational => "relational",
			WriteTarget::Both => "both",
		}
	}
}

impl Display for ReadTarget {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Display for WriteTarget {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ReadTarget {
	type Err = CollectionError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"document" => Ok(ReadTarget::Document),
			"relational" => Ok(ReadTarget::Relational),
			_ => Err(CollectionError::UnknownTarget {
				value: s.to_string(),
			}),
		}
	}
}

impl FromStr for WriteTarget {
	type Err = CollectionError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"document" => Ok(WriteTarget::Document),
			"relational" => Ok(WriteTarget::Relational),
			"both" => Ok(WriteTarget::Both),
			_ => Err(CollectionError::UnknownTarget {
				value: s.to_string(),
			}),
		}
	}
}

/// The per-collection routing state the migration lock persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MigrationTarget {
	pub read: ReadTarget,
	pub write: WriteTarget,
}

impl MigrationTarget {
	/// Before migration: everything on the document backend.
	pub const DOCUMENT: MigrationTarget = MigrationTarget {
		read: ReadTarget::Document,
		write: WriteTarget::Document,
	};

	/// During cutover: reads stay on the document backend, writes go to both.
	pub const MIRRORED: MigrationTarget = MigrationTarget {
		read: ReadTarget::Document,
		write: WriteTarget::Both,
	};

	/// After migration: everything on the relational backend.
	pub const RELATIONAL: MigrationTarget = MigrationTarget {
		read: ReadTarget::Relational,
		write: WriteTarget::Relational,
	};

	pub fn new(read: ReadTarget, write: WriteTarget) -> Self {
		Self {
			read,
			write,
		}
	}

	pub fn is_migrated(&self) -> bool {
		*self == Self::RELATIONAL
	}
}

impl Display for MigrationTarget {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{{read: {}, write: {}}}", self.read, self.write)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn test_serde_is_lowercase() {
		let target = MigrationTarget::MIRRORED;
		assert_eq!(serde_json::to_value(target).unwrap(), json!({"read": "document", "write": "both"}));
		assert_eq!(serde_json::from_value::<MigrationTarget>(json!({"read": "relational", "write": "relational"})).unwrap(), MigrationTarget::RELATIONAL);
	}

	#[test]
	fn test_parse() {
		assert_eq!("both".parse::<WriteTarget>().unwrap(), WriteTarget::Both);
		assert_eq!("relational".parse::<ReadTarget>().unwrap(), ReadTarget::Relational);
		assert_eq!(
			"both".parse::<ReadTarget>().unwrap_err(),
			CollectionError::UnknownTarget {
				value: "both".to_string()
			}
		);
	}

	#[test]
	fn test_document_backend_is_canonical_when_mirroring() {
		assert_eq!(WriteTarget::Both.backends(), (Backend::Document, &[Backend::Relational][..]));
		assert!(WriteTarget::Relational.backends().1.is_empty());
	}

	#[test]
	fn test_display() {
		assert_eq!(MigrationTarget::DOCUMENT.to_string(), "{read: document, write: document}");
		assert!(MigrationTarget::RELATIONAL.is_migrated());
		assert!(!MigrationTarget::MIRRORED.is_migrated());
	}
}
