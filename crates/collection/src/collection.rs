// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use async_trait::async_trait;
use mongo2pg_type::{Document, IndexDef, Value};

use crate::{DeleteResult, FindOptions, InsertManyResult, InsertOneResult, Result, UpdateOptions, UpdateResult};

/// The operation surface of one logical collection.
///
/// Selectors, modifiers and pipelines use the document query language. Each
/// method corresponds to one [`Operation`](crate::Operation).
#[async_trait]
pub trait Collection: Send + Sync {
	fn name(&self) -> &str;

	async fn find(&self, selector: &Document, options: &FindOptions) -> Result<Vec<Document>>;

	async fn find_one(&self, selector: &Document, options: &FindOptions) -> Result<Option<Document>>;

	async fn count(&self, selector: &Document) -> Result<u64>;

	async fn aggregate(&self, pipeline: &[Value]) -> Result<Vec<Document>>;

	/// Inserts one document, generating its identity if it has none.
	async fn insert_one(&self, document: &Document) -> Result<InsertOneResult>;

	async fn insert_many(&self, documents: &[Document]) -> Result<InsertManyResult>;

	async fn update_one(&self, selector: &Document, modifier: &Document, options: &UpdateOptions)
	-> Result<UpdateResult>;

	async fn update_many(&self, selector: &Document, modifier: &Document) -> Result<UpdateResult>;

	async fn delete_one(&self, selector: &Document) -> Result<DeleteResult>;

	/// Deletes every matching document; an empty selector matches all of them.
	async fn delete_many(&self, selector: &Document) -> Result<DeleteResult>;

	async fn ensure_index(&self, index: &IndexDef) -> Result<()>;
}
