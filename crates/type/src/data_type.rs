// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Relational storage type of a field.
///
/// `NotNull` and `Default` are wrappers: they change the column definition but
/// delegate the concrete storage form (used for casts and array hints) to the
/// type they wrap.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
	/// UTF-8 text.
	Text,
	/// A 4-byte signed integer.
	Integer,
	/// An 8-byte signed integer.
	BigInt,
	/// An 8-byte floating point.
	Double,
	/// Arbitrary precision number.
	Numeric,
	/// A boolean: true or false.
	Boolean,
	/// Timestamp with time zone.
	Timestamp,
	/// Binary JSON document.
	Jsonb,
	/// A UUID.
	Uuid,
	/// A one-dimensional array of the inner type.
	Array(Box<DataType>),
	/// The inner type with a NOT NULL constraint.
	NotNull(Box<DataType>),
	/// The inner type with a column default, given as SQL text.
	Default {
		inner: Box<DataType>,
		value: String,
	},
}

impl DataType {
	pub fn array(inner: DataType) -> Self {
		DataType::Array(Box::new(inner))
	}

	pub fn not_null(self) -> Self {
		DataType::NotNull(Box::new(self))
	}

	pub fn with_default(self, value: impl Into<String>) -> Self {
		DataType::Default {
			inner: Box::new(self),
			value: value.into(),
		}
	}

	/// The storage form with every wrapper removed.
	pub fn concrete(&self) -> &DataType {
		match self {
			DataType::NotNull(inner) => inner.concrete(),
			DataType::Default {
				inner,
				..
			} => inner.concrete(),
			other => other,
		}
	}

	/// SQL name of the concrete storage form, usable in a cast.
	pub fn sql_name(&self) -> String {
		match self.concrete() {
			DataType::Text => "text".to_string(),
			DataType::Integer => "integer".to_string(),
			DataType::BigInt => "bigint".to_string(),
			DataType::Double => "double precision".to_string(),
			DataType::Numeric => "numeric".to_string(),
			DataType::Boolean => "boolean".to_string(),
			DataType::Timestamp => "timestamptz".to_string(),
			DataType::Jsonb => "jsonb".to_string(),
			DataType::Uuid => "uuid".to_string(),
			DataType::Array(inner) => format!("{}[]", inner.sql_name()),
			DataType::NotNull(_)
			| DataType::Default {
				..
			} => unreachable!("concrete() strips wrappers"),
		}
	}

	/// Column definition as used in CREATE TABLE, wrappers included.
	pub fn column_definition(&self) -> String {
		match self {
			DataType::NotNull(inner) => format!("{} NOT NULL", inner.column_definition()),
			DataType::Default {
				inner,
				value,
			} => format!("{} DEFAULT {value}", inner.column_definition()),
			other => other.sql_name(),
		}
	}

	pub fn is_json(&self) -> bool {
		matches!(self.concrete(), DataType::Jsonb)
	}

	pub fn is_number(&self) -> bool {
		matches!(self.concrete(), DataType::Integer | DataType::BigInt | DataType::Double | DataType::Numeric)
	}

	pub fn is_not_null(&self) -> bool {
		match self {
			DataType::NotNull(_) => true,
			DataType::Default {
				inner,
				..
			} => inner.is_not_null(),
			_ => false,
		}
	}

	/// Element type when the concrete form is an array.
	pub fn element(&self) -> Option<&DataType> {
		match self.concrete() {
			DataType::Array(inner) => Some(inner),
			_ => None,
		}
	}

	/// Placeholder a NULL is coalesced to inside unique indexes and upsert conflict
	/// targets, so that two NULLs collide the way the document store treats missing
	/// values in a unique index.
	pub fn null_sentinel(&self) -> &'static str {
		match self.concrete() {
			DataType::Text => "''",
			DataType::Integer | DataType::BigInt | DataType::Double | DataType::Numeric => "0",
			DataType::Boolean => "false",
			DataType::Timestamp => "'epoch'::timestamptz",
			DataType::Jsonb => "'null'::jsonb",
			DataType::Uuid => "'00000000-0000-0000-0000-000000000000'::uuid",
			DataType::Array(_) => "'{}'",
			DataType::NotNull(_)
			| DataType::Default {
				..
			} => unreachable!("concrete() strips wrappers"),
		}
	}
}

impl Display for DataType {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.column_definition())
	}
}
