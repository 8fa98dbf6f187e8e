// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::Arc;

use async_trait::async_trait;
use mongo2pg_driver::{Driver, Row};
use mongo2pg_sql::{
	DeleteOptions, InsertOptions, SelectOptions, UpsertCounts, UpsertOutcome, UpsertTarget, aggregate, count,
	ddl::create_index, delete, expression::is_expression, insert, select, update,
};
use mongo2pg_type::{Catalog, Document, IndexDef, Relation, Value, is_operator_key};
use tracing::{debug, instrument};

use crate::{
	Collection, CollectionError, DeleteResult, FindOptions, InsertManyResult, InsertOneResult, Operation, Result,
	UpdateOptions, UpdateResult,
};

/// A collection stored in one relational table.
pub struct RelationalCollection<D: Driver> {
	driver: Arc<D>,
	relation: Relation,
	catalog: Arc<dyn Catalog + Send + Sync>,
}

impl<D: Driver> RelationalCollection<D> {
	pub fn new(driver: Arc<D>, relation: Relation) -> Self {
		let catalog: Arc<dyn Catalog + Send + Sync> = Arc::new(vec![relation.clone()]);
		Self {
			driver,
			relation,
			catalog,
		}
	}

	/// Relations `$lookup` stages may join.
	pub fn with_catalog(mut self, catalog: Arc<dyn Catalog + Send + Sync>) -> Self {
		self.catalog = catalog;
		self
	}

	pub fn relation(&self) -> &Relation {
		&self.relation
	}

	fn select_options(options: &FindOptions) -> SelectOptions {
		SelectOptions {
			projection: options.projection.clone(),
			sort: options.sort.clone(),
			limit: options.limit,
			skip: options.skip,
			for_update: false,
		}
	}

	async fn upsert(&self, selector: &Document, modifier: &Document, id: Option<&Value>) -> Result<UpdateResult> {
		let matched = equality_fields(selector);
		let mut row = matched.clone();
		if let Some(id) = id {
			row.entry(self.relation.identity().to_string()).or_insert_with(|| id.clone());
		}
		for operator in ["$set", "$inc"] {
			if let Some(Value::Object(fields)) = modifier.get(operator) {
				for (name, value) in fields {
					if !name.contains('.') && !is_expression(value) {
						row.insert(name.clone(), value.clone());
					}
				}
			}
		}

		let options = InsertOptions::upsert(UpsertTarget {
			selector: Some(matched),
			modifier: Some(modifier.clone()),
		});
		let statement = insert(&self.relation, &[row], &options)?.statement;
		let returned = self.driver.one(&statement.compile()).await?;

		let Some(outcome) = UpsertOutcome::from_row(&returned) else {
			return Err(CollectionError::UnexpectedResult {
				operation: Operation::UpdateOne,
				message: "upsert returned no 'inserted' marker".to_string(),
			});
		};
		let counts = UpsertCounts::from(outcome);
		Ok(UpdateResult {
			matched: counts.matched,
			modified: counts.matched,
			upserted_id: match outcome {
				UpsertOutcome::Inserted => returned.get(self.relation.identity()).cloned(),
				UpsertOutcome::Updated => None,
			},
		})
	}
}

/// Top-level `field: literal` pairs of a selector.
fn equality_fields(selector: &Document) -> Document {
	selector.iter()
		.filter(|(name, value)| {
			!is_operator_key(name) && !name.contains('.') && !matches!(value, Value::Object(_) | Value::Null)
		})
		.map(|(name, value)| (name.clone(), value.clone()))
		.collect()
}

/// Converts a result row to a document. `NULL` columns are left out, the way
/// a document without the field would read.
pub fn row_to_document(row: Row) -> Document {
	row.into_iter().filter(|(_, value)| !value.is_null()).collect()
}

#[async_trait]
impl<D: Driver + 'static> Collection for RelationalCollection<D> {
	fn name(&self) -> &str {
		self.relation.name()
	}

	#[instrument(name = "collection::relational::find", level = "debug", skip_all, fields(collection = %self.relation.name()))]
	async fn find(&self, selector: &Document, options: &FindOptions) -> Result<Vec<Document>> {
		let statement = select(&self.relation, selector, &Self::select_options(options))?;
		let rows = self.driver.any(&statement.compile()).await?;
		debug!(rows = rows.len(), "found");
		Ok(rows.into_iter().map(row_to_document).collect())
	}

	async fn find_one(&self, selector: &Document, options: &FindOptions) -> Result<Option<Document>> {
		let options = Self::select_options(options).with_limit(1);
		let statement = select(&self.relation, selector, &options)?;
		let rows = self.driver.any(&statement.compile()).await?;
		Ok(rows.into_iter().next().map(row_to_document))
	}

	async fn count(&self, selector: &Document) -> Result<u64> {
		let statement = count(&self.relation, selector)?;
		let row = self.driver.one(&statement.compile()).await?;
		row.get("count").and_then(Value::as_u64).ok_or_else(|| CollectionError::UnexpectedResult {
			operation: Operation::Count,
			message: format!("expected a 'count' column, got {row:?}"),
		})
	}

	#[instrument(name = "collection::relational::aggregate", level = "debug", skip_all, fields(collection = %self.relation.name(), stages = pipeline.len()))]
	async fn aggregate(&self, pipeline: &[Value]) -> Result<Vec<Document>> {
		let statement = aggregate(&self.relation, pipeline, self.catalog.as_ref())?;
		let rows = self.driver.any(&statement.compile()).await?;
		Ok(rows.into_iter().map(row_to_document).collect())
	}

	#[instrument(name = "collection::relational::insert_one", level = "debug", skip_all, fields(collection = %self.relation.name()))]
	async fn insert_one(&self, document: &Document) -> Result<InsertOneResult> {
		let built = insert(&self.relation, std::slice::from_ref(document), &InsertOptions::default())?;
		self.driver.none(&built.statement.compile()).await?;
		Ok(InsertOneResult {
			inserted_id: built.identities.into_iter().next().unwrap_or(Value::Null),
		})
	}

	#[instrument(name = "collection::relational::insert_many", level = "debug", skip_all, fields(collection = %self.relation.name(), documents = documents.len()))]
	async fn insert_many(&self, documents: &[Document]) -> Result<InsertManyResult> {
		if documents.is_empty() {
			return Ok(InsertManyResult {
				inserted_ids: vec![],
			});
		}
		let built = insert(&self.relation, documents, &InsertOptions::default())?;
		self.driver.none(&built.statement.compile()).await?;
		Ok(InsertManyResult {
			inserted_ids: built.identities,
		})
	}

	#[instrument(name = "collection::relational::update_one", level = "debug", skip_all, fields(collection = %self.relation.name(), upsert = options.upsert))]
	async fn update_one(
		&self,
		selector: &Document,
		modifier: &Document,
		options: &UpdateOptions,
	) -> Result<UpdateResult> {
		let statement = update(&self.relation, selector, modifier, &mongo2pg_sql::UpdateOptions::one())?;
		let affected = self.driver.none(&statement.compile()).await?;
		if affected == 0 && options.upsert {
			return self.upsert(selector, modifier, options.upsert_id.as_ref()).await;
		}
		Ok(UpdateResult {
			matched: affected,
			modified: affected,
			upserted_id: None,
		})
	}

	async fn update_many(&self, selector: &Document, modifier: &Document) -> Result<UpdateResult> {
		let statement = update(&self.relation, selector, modifier, &mongo2pg_sql::UpdateOptions::default())?;
		let affected = self.driver.none(&statement.compile()).await?;
		Ok(UpdateResult {
			matched: affected,
			modified: affected,
			upserted_id: None,
		})
	}

	async fn delete_one(&self, selector: &Document) -> Result<DeleteResult> {
		let statement = delete(&self.relation, selector, &DeleteOptions::one().allow_unfiltered())?;
		Ok(DeleteResult {
			deleted: self.driver.none(&statement.compile()).await?,
		})
	}

	async fn delete_many(&self, selector: &Document) -> Result<DeleteResult> {
		let statement = delete(&self.relation, selector, &DeleteOptions::default().allow_unfiltered())?;
		Ok(DeleteResult {
			deleted: self.driver.none(&statement.compile()).await?,
		})
	}

	async fn ensure_index(&self, index: &IndexDef) -> Result<()> {
		let statement = create_index(&self.relation, index)?;
		self.driver.none(&statement.compile()).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn test_row_to_document_drops_nulls() {
		let row = json!({"_id": "1", "name": "a", "age": null}).as_object().unwrap().clone();
		assert_eq!(Value::Object(row_to_document(row)), json!({"_id": "1", "name": "a"}));
	}

	#[test]
	fn test_equality_fields() {
		let selector = json!({"_id": "1", "age": {"$gt": 3}, "meta.x": 1, "$comment": "c", "name": "a"});
		assert_eq!(
			Value::Object(equality_fields(selector.as_object().unwrap())),
			json!({"_id": "1", "name": "a"})
		);
	}
}
