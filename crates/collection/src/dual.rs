// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::{
	Arc,
	atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, join, join_all};
use mongo2pg_type::{Document, IndexDef, Value};
use parking_lot::RwLock;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::{
	Backend, Collection, CollectionError, DeleteResult, FindOptions, InsertManyResult, InsertOneResult,
	MigrationTarget, Operation, Result, Route, UpdateOptions, UpdateResult,
};

/// The backends one call goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
	/// Its result is the call's result.
	pub canonical: Backend,
	/// Called concurrently with the canonical backend; results are discarded.
	pub mirrors: &'static [Backend],
}

/// One logical collection backed by a document and a relational collection.
///
/// Reads go to the read target. Writes go to every backend of the write
/// target; with both, the document backend is canonical and the relational
/// backend is mirrored. The target is shared with the process's watcher through
/// [`DualCollection::target_handle`].
pub struct DualCollection {
	name: String,
	identity: String,
	document: Arc<dyn Collection>,
	relational: Arc<dyn Collection>,
	target: Arc<RwLock<MigrationTarget>>,
	mirror_failures: AtomicU64,
}

impl DualCollection {
	pub fn new(name: impl Into<String>, document: Arc<dyn Collection>, relational: Arc<dyn Collection>) -> Self {
		Self {
			name: name.into(),
			identity: "_id".to_string(),
			document,
			relational,
			target: Arc::new(RwLock::new(MigrationTarget::DOCUMENT)),
			mirror_failures: AtomicU64::new(0),
		}
	}

	pub fn with_target(self, target: MigrationTarget) -> Self {
		*self.target.write() = target;
		self
	}

	/// The identity field assigned before a mirrored insert, `_id` by default.
	pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
		self.identity = identity.into();
		self
	}

	pub fn target(&self) -> MigrationTarget {
		*self.target.read()
	}

	pub fn set_target(&self, target: MigrationTarget) {
		let mut current = self.target.write();
		let previous = *current;
		if previous != target {
			debug!(collection = %self.name, from = %previous, to = %target, "switching target");
			*current = target;
		}
	}

	pub fn target_handle(&self) -> Arc<RwLock<MigrationTarget>> {
		Arc::clone(&self.target)
	}

	/// Number of mirrored writes that failed since creation.
	pub fn mirror_failures(&self) -> u64 {
		self.mirror_failures.load(Ordering::Relaxed)
	}

	/// Routes `operation` under the current target.
	pub fn dispatch(&self, operation: Operation) -> Dispatch {
		let target = self.target();
		match operation.route() {
			Route::Read | Route::Other => Dispatch {
				canonical: target.read.backend(),
				mirrors: &[],
			},
			Route::Write => {
				let (canonical, mirrors) = target.write.backends();
				Dispatch {
					canonical,
					mirrors,
				}
			}
		}
	}

	pub fn backend(&self, backend: Backend) -> &dyn Collection {
		match backend {
			Backend::Document => self.document.as_ref(),
			Backend::Relational => self.relational.as_ref(),
		}
	}

	async fn run<'a, T, F>(&'a self, operation: Operation, call: F) -> Result<T>
	where
		T: Send,
		F: Fn(&'a dyn Collection) -> BoxFuture<'a, Result<T>> + Send,
	{
		let dispatch = self.dispatch(operation);
		if dispatch.mirrors.is_empty() {
			return call(self.backend(dispatch.canonical)).await;
		}

		let mirrored = join_all(dispatch.mirrors.iter().map(|backend| call(self.backend(*backend))));
		let (result, mirrored) = join(call(self.backend(dispatch.canonical)), mirrored).await;

		let mut failure = None;
		for (backend, outcome) in dispatch.mirrors.iter().zip(mirrored) {
			if let Err(error) = outcome {
				let failures = self.mirror_failures.fetch_add(1, Ordering::Relaxed) + 1;
				error!(
					collection = %self.name,
					%operation,
					%backend,
					failures,
					%error,
					"mirrored write failed"
				);
				failure.get_or_insert((*backend, error));
			}
		}

		match (result, failure) {
			(Ok(_), Some((backend, error))) => Err(CollectionError::MirrorWrite {
				backend,
				operation,
				source: Box::new(error),
			}),
			(result, _) => result,
		}
	}

	/// Gives the document an identity up front so every backend stores the same one.
	fn with_identity_assigned(&self, document: &Document) -> Document {
		let mut document = document.clone();
		if document.get(&self.identity).is_none_or(Value::is_null) {
			document.insert(self.identity.clone(), Value::String(Uuid::now_v7().simple().to_string()));
		}
		document
	}

	/// An upsert whose selector does not fix the identity gets one up front, so
	/// a miss inserts the same identity on every backend.
	fn with_upsert_id_assigned(&self, selector: &Document, options: &UpdateOptions) -> UpdateOptions {
		let mut options = options.clone();
		let fixed = selector.get(&self.identity).is_some_and(|id| !id.is_null() && !id.is_object());
		if options.upsert && !fixed && options.upsert_id.is_none() {
			options.upsert_id = Some(Value::String(Uuid::now_v7().simple().to_string()));
		}
		options
	}
}

#[async_trait]
impl Collection for DualCollection {
	fn name(&self) -> &str {
		&self.name
	}

	async fn find(&self, selector: &Document, options: &FindOptions) -> Result<Vec<Document>> {
		self.run(Operation::Find, |c| c.find(selector, options)).await
	}

	async fn find_one(&self, selector: &Document, options: &FindOptions) -> Result<Option<Document>> {
		self.run(Operation::FindOne, |c| c.find_one(selector, options)).await
	}

	async fn count(&self, selector: &Document) -> Result<u64> {
		self.run(Operation::Count, |c| c.count(selector)).await
	}

	async fn aggregate(&self, pipeline: &[Value]) -> Result<Vec<Document>> {
		self.run(Operation::Aggregate, |c| c.aggregate(pipeline)).await
	}

	#[instrument(name = "collection::dual::insert_one", level = "debug", skip_all, fields(collection = %self.name))]
	async fn insert_one(&self, document: &Document) -> Result<InsertOneResult> {
		let document = self.with_identity_assigned(document);
		let document = &document;
		self.run(Operation::InsertOne, |c| c.insert_one(document)).await
	}

	#[instrument(name = "collection::dual::insert_many", level = "debug", skip_all, fields(collection = %self.name, documents = documents.len()))]
	async fn insert_many(&self, documents: &[Document]) -> Result<InsertManyResult> {
		let documents: Vec<Document> = documents.iter().map(|d| self.with_identity_assigned(d)).collect();
		let documents = documents.as_slice();
		self.run(Operation::InsertMany, |c| c.insert_many(documents)).await
	}

	#[instrument(name = "collection::dual::update_one", level = "debug", skip_all, fields(collection = %self.name))]
	async fn update_one(
		&self,
		selector: &Document,
		modifier: &Document,
		options: &UpdateOptions,
	) -> Result<UpdateResult> {
		let options = self.with_upsert_id_assigned(selector, options);
		let options = &options;
		self.run(Operation::UpdateOne, |c| c.update_one(selector, modifier, options)).await
	}

	#[instrument(name = "collection::dual::update_many", level = "debug", skip_all, fields(collection = %self.name))]
	async fn update_many(&self, selector: &Document, modifier: &Document) -> Result<UpdateResult> {
		self.run(Operation::UpdateMany, |c| c.update_many(selector, modifier)).await
	}

	#[instrument(name = "collection::dual::delete_one", level = "debug", skip_all, fields(collection = %self.name))]
	async fn delete_one(&self, selector: &Document) -> Result<DeleteResult> {
		self.run(Operation::DeleteOne, |c| c.delete_one(selector)).await
	}

	#[instrument(name = "collection::dual::delete_many", level = "debug", skip_all, fields(collection = %self.name))]
	async fn delete_many(&self, selector: &Document) -> Result<DeleteResult> {
		self.run(Operation::DeleteMany, |c| c.delete_many(selector)).await
	}

	async fn ensure_index(&self, index: &IndexDef) -> Result<()> {
		self.run(Operation::EnsureIndex, |c| c.ensure_index(index)).await
	}
}
