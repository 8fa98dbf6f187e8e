// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{DataType, Result, TypeError};

pub const DEFAULT_IDENTITY: &str = "_id";

/// A secondary index on a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
	pub name: String,
	pub fields: Vec<String>,
	pub unique: bool,
}

impl IndexDef {
	pub fn new(name: impl Into<String>, fields: &[&str]) -> Self {
		Self {
			name: name.into(),
			fields: fields.iter().map(|f| f.to_string()).collect(),
			unique: false,
		}
	}

	pub fn unique(mut self) -> Self {
		self.unique = true;
		self
	}
}

/// A relation: a name plus an ordered field to type map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
	name: String,
	fields: IndexMap<String, DataType>,
	identity: String,
	indexes: Vec<IndexDef>,
	created_field: Option<String>,
}

impl Relation {
	pub fn builder(name: impl Into<String>) -> RelationBuilder {
		RelationBuilder::new(name)
	}

	/// A relation describing the output of a derived select. It is never emitted
	/// by name; it only scopes field resolution for the statement wrapping it.
	pub fn derived(fields: IndexMap<String, DataType>, identity: Option<&str>) -> Self {
		Self {
			name: String::new(),
			identity: identity.unwrap_or(DEFAULT_IDENTITY).to_string(),
			fields,
			indexes: vec![],
			created_field: None,
		}
	}

	/// A copy with extra computed fields appended, e.g. the arrays a lookup adds.
	pub fn with_fields(&self, extra: impl IntoIterator<Item = (String, DataType)>) -> Self {
		let mut relation = self.clone();
		for (name, data_type) in extra {
			relation.fields.insert(name, data_type);
		}
		relation
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn fields(&self) -> &IndexMap<String, DataType> {
		&self.fields
	}

	pub fn field(&self, name: &str) -> Option<&DataType> {
		self.fields.get(name)
	}

	pub fn has_field(&self, name: &str) -> bool {
		self.fields.contains_key(name)
	}

	pub fn identity(&self) -> &str {
		&self.identity
	}

	pub fn indexes(&self) -> &[IndexDef] {
		&self.indexes
	}

	pub fn created_field(&self) -> Option<&str> {
		self.created_field.as_deref()
	}
}

pub struct RelationBuilder {
	name: String,
	fields: Vec<(String, DataType)>,
	identity: (String, DataType),
	indexes: Vec<IndexDef>,
	created_field: Option<String>,
}

impl RelationBuilder {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			fields: vec![],
			identity: (DEFAULT_IDENTITY.to_string(), DataType::Text.not_null()),
			indexes: vec![],
			created_field: None,
		}
	}

	/// Overrides the identity column, `_id text NOT NULL` by default.
	pub fn identity(mut self, name: impl Into<String>, data_type: DataType) -> Self {
		self.identity = (name.into(), data_type);
		self
	}

	pub fn field(mut self, name: impl Into<String>, data_type: DataType) -> Self {
		self.fields.push((name.into(), data_type));
		self
	}

	pub fn index(mut self, index: IndexDef) -> Self {
		self.indexes.push(index);
		self
	}

	pub fn created_field(mut self, name: impl Into<String>) -> Self {
		self.created_field = Some(name.into());
		self
	}

	pub fn build(self) -> Result<Relation> {
		if self.name.is_empty() {
			return Err(TypeError::EmptyName);
		}

		let mut fields = IndexMap::with_capacity(self.fields.len() + 1);
		let (identity, identity_type) = self.identity;
		fields.insert(identity.clone(), identity_type);

		for (name, data_type) in self.fields {
			if fields.contains_key(&name) {
				return Err(TypeError::DuplicateField {
					relation: self.name,
					field: name,
				});
			}
			fields.insert(name, data_type);
		}

		for index in &self.indexes {
			for field in &index.fields {
				if !fields.contains_key(field) {
					return Err(TypeError::MissingField {
						relation: self.name,
						field: field.clone(),
						referenced_by: format!("index '{}'", index.name),
					});
				}
			}
		}

		if let Some(created) = &self.created_field {
			if !fields.contains_key(created) {
				return Err(TypeError::MissingField {
					relation: self.name,
					field: created.clone(),
					referenced_by: "created_field".to_string(),
				});
			}
		}

		Ok(Relation {
			name: self.name,
			fields,
			identity,
			indexes: self.indexes,
			created_field: self.created_field,
		})
	}
}
