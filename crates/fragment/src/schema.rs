// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::collections::HashMap;

use indexmap::IndexMap;
use mongo2pg_sql::SqlError;
use mongo2pg_type::{Catalog, Relation, Value};

use crate::Result;

/// A link from a field of one relation to rows of another.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
	pub relation: String,
	pub local_field: String,
	pub foreign_field: String,
}

impl Link {
	pub fn new(relation: impl Into<String>, local_field: impl Into<String>, foreign_field: impl Into<String>) -> Self {
		Self {
			relation: relation.into(),
			local_field: local_field.into(),
			foreign_field: foreign_field.into(),
		}
	}
}

/// How a selected field is produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolver {
	/// Reads a column, possibly stored under another name.
	Column(String),
	/// An expression in the pipeline expression language, e.g. `{"$concat": [...]}`.
	Expression(Value),
	/// Computed by application code from the listed columns.
	Code {
		requires: Vec<String>,
	},
	/// At most one linked row, selected as an object or `null`.
	ToOne(Link),
	/// Any number of linked rows, selected as an array.
	ToMany(Link),
}

/// Relations plus the resolvers of their non-column fields.
///
/// A field without a registered resolver reads the column of the same name.
#[derive(Debug, Clone, Default)]
pub struct Schema {
	relations: IndexMap<String, Relation>,
	resolvers: HashMap<String, HashMap<String, Resolver>>,
}

impl Schema {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_relation(mut self, relation: Relation) -> Self {
		self.relations.insert(relation.name().to_string(), relation);
		self
	}

	pub fn with_resolver(mut self, relation: &str, field: &str, resolver: Resolver) -> Self {
		self.resolvers.entry(relation.to_string()).or_default().insert(field.to_string(), resolver);
		self
	}

	pub fn get(&self, name: &str) -> Result<&Relation> {
		self.relations.get(name).ok_or_else(|| {
			SqlError::UnknownRelation {
				name: name.to_string(),
			}
			.into()
		})
	}

	/// The resolver for `field` of `relation`.
	pub fn resolver(&self, relation: &Relation, field: &str) -> Result<Resolver> {
		if let Some(resolver) = self.resolvers.get(relation.name()).and_then(|fields| fields.get(field)) {
			return Ok(resolver.clone());
		}
		if relation.has_field(field) || field.split_once('.').is_some_and(|(root, _)| relation.has_field(root)) {
			return Ok(Resolver::Column(field.to_string()));
		}
		Err(SqlError::unknown_field(relation.name(), field).into())
	}
}

impl Catalog for Schema {
	fn relation(&self, name: &str) -> Option<&Relation> {
		self.relations.get(name)
	}
}
