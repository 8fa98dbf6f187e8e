// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use serde_json::Value;

use crate::DataType;

/// Runtime kind of a document value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
	Null,
	Boolean,
	Number,
	String,
	Array,
	Object,
}

impl ValueKind {
	pub fn of(value: &Value) -> Self {
		match value {
			Value::Null => ValueKind::Null,
			Value::Bool(_) => ValueKind::Boolean,
			Value::Number(_) => ValueKind::Number,
			Value::String(_) => ValueKind::String,
			Value::Array(_) => ValueKind::Array,
			Value::Object(_) => ValueKind::Object,
		}
	}

	/// Storage type a value of this kind is compared as once extracted from JSON.
	pub fn data_type(&self) -> DataType {
		match self {
			ValueKind::Boolean => DataType::Boolean,
			ValueKind::Number => DataType::Numeric,
			ValueKind::String => DataType::Text,
			ValueKind::Null | ValueKind::Array | ValueKind::Object => DataType::Jsonb,
		}
	}
}

/// Keys starting with `$` are operators (`$set`, `$gt`, `$and`, ...), never field names.
pub fn is_operator_key(key: &str) -> bool {
	key.starts_with('$')
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn test_kind_data_type() {
		assert_eq!(ValueKind::of(&json!(1.5)).data_type(), DataType::Numeric);
		assert_eq!(ValueKind::of(&json!("x")).data_type(), DataType::Text);
		assert_eq!(ValueKind::of(&json!(true)).data_type(), DataType::Boolean);
		assert_eq!(ValueKind::of(&json!({"a": 1})).data_type(), DataType::Jsonb);
	}
}
