// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use mongo2pg_type::{Document, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
	pub projection: Option<Document>,
	pub sort: Option<Document>,
	pub limit: Option<u64>,
	pub skip: Option<u64>,
}

impl FindOptions {
	pub fn with_projection(mut self, projection: Document) -> Self {
		self.projection = Some(projection);
		self
	}

	pub fn with_sort(mut self, sort: Document) -> Self {
		self.sort = Some(sort);
		self
	}

	pub fn with_limit(mut self, limit: u64) -> Self {
		self.limit = Some(limit);
		self
	}

	pub fn with_skip(mut self, skip: u64) -> Self {
		self.skip = Some(skip);
		self
	}
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
	/// Insert a document built from the selector and modifier when nothing matches.
	pub upsert: bool,
	/// Identity of the upserted document when the selector does not fix one.
	pub upsert_id: Option<Value>,
}

impl UpdateOptions {
	pub fn upsert() -> Self {
		Self {
			upsert: true,
			upsert_id: None,
		}
	}

	pub fn with_upsert_id(mut self, id: Value) -> Self {
		self.upsert_id = Some(id);
		self
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
	pub inserted_id: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyResult {
	pub inserted_ids: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
	pub matched: u64,
	pub modified: u64,
	pub upserted_id: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeleteResult {
	pub deleted: u64,
}
