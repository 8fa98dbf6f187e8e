// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::collections::HashMap;

/// One element of a parsed field selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
	/// A plain field, optionally renamed in the output.
	Field {
		name: String,
		alias: Option<String>,
	},
	/// Inlines the entries of another fragment over the same relation.
	Spread {
		name: String,
	},
	/// A link field with a nested selection over the linked relation.
	Pick {
		name: String,
		alias: Option<String>,
		entries: Vec<Entry>,
	},
}

impl Entry {
	pub fn field(name: impl Into<String>) -> Self {
		Entry::Field {
			name: name.into(),
			alias: None,
		}
	}

	pub fn spread(name: impl Into<String>) -> Self {
		Entry::Spread {
			name: name.into(),
		}
	}

	pub fn pick(name: impl Into<String>, entries: Vec<Entry>) -> Self {
		Entry::Pick {
			name: name.into(),
			alias: None,
			entries,
		}
	}

	/// Renames a field or pick in the output. Spreads have no name of their own.
	pub fn with_alias(self, alias: impl Into<String>) -> Self {
		match self {
			Entry::Field {
				name,
				..
			} => Entry::Field {
				name,
				alias: Some(alias.into()),
			},
			Entry::Pick {
				name,
				entries,
				..
			} => Entry::Pick {
				name,
				alias: Some(alias.into()),
				entries,
			},
			spread @ Entry::Spread {
				..
			} => spread,
		}
	}
}

/// A named selection over one relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
	pub name: String,
	pub relation: String,
	pub entries: Vec<Entry>,
}

impl Fragment {
	pub fn new(name: impl Into<String>, relation: impl Into<String>, entries: Vec<Entry>) -> Self {
		Self {
			name: name.into(),
			relation: relation.into(),
			entries,
		}
	}
}

/// Looks up fragments referenced by spreads.
pub trait FragmentSource {
	fn get_fragment(&self, name: &str) -> Option<&Fragment>;
}

impl FragmentSource for [Fragment] {
	fn get_fragment(&self, name: &str) -> Option<&Fragment> {
		self.iter().find(|f| f.name == name)
	}
}

impl FragmentSource for Vec<Fragment> {
	fn get_fragment(&self, name: &str) -> Option<&Fragment> {
		self.as_slice().get_fragment(name)
	}
}

impl FragmentSource for HashMap<String, Fragment> {
	fn get_fragment(&self, name: &str) -> Option<&Fragment> {
		self.get(name)
	}
}
