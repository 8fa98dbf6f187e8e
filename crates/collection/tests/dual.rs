// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Routing of the dual collection across the three migration targets

use std::sync::Arc;

use mongo2pg_collection::{
	Backend, Collection, CollectionError, Dispatch, DualCollection, FindOptions, MigrationTarget, Operation,
	RelationalCollection, UpdateOptions,
};
use mongo2pg_driver::Executor;
use mongo2pg_sql::ddl::{CreateTableOptions, create_table};
use mongo2pg_testing::{MemoryDocumentCollection, MemoryDriver};
use mongo2pg_type::{DataType, Document, Relation, Value};
use serde_json::json;

fn users() -> Relation {
	Relation::builder("users").field("name", DataType::Text).field("age", DataType::Integer).build().unwrap()
}

fn doc(value: Value) -> Document {
	value.as_object().unwrap().clone()
}

struct Fixture {
	document: Arc<MemoryDocumentCollection>,
	driver: MemoryDriver,
	dual: DualCollection,
}

async fn fixture(target: MigrationTarget) -> Fixture {
	let driver = MemoryDriver::new();
	driver.none(&create_table(&users(), CreateTableOptions::default()).compile()).await.unwrap();

	let document = Arc::new(MemoryDocumentCollection::new("users"));
	let relational = Arc::new(RelationalCollection::new(Arc::new(driver.clone()), users()));
	let dual = DualCollection::new("users", document.clone(), relational).with_target(target);
	Fixture {
		document,
		driver,
		dual,
	}
}

#[tokio::test]
async fn test_document_target_stays_on_document_backend() {
	let fixture = fixture(MigrationTarget::DOCUMENT).await;

	fixture.dual.insert_one(&doc(json!({"name": "ada", "age": 36}))).await.unwrap();

	assert_eq!(fixture.document.documents().len(), 1);
	assert!(fixture.driver.rows("users").is_empty());

	let found = fixture.dual.find(&doc(json!({"name": "ada"})), &FindOptions::default()).await.unwrap();
	assert_eq!(found.len(), 1);
	assert_eq!(found[0].get("age"), Some(&json!(36)));
}

#[tokio::test]
async fn test_mirrored_writes_reach_both_backends() {
	let fixture = fixture(MigrationTarget::MIRRORED).await;

	let inserted = fixture.dual.insert_one(&doc(json!({"name": "ada", "age": 36}))).await.unwrap();

	let stored = fixture.document.get(&inserted.inserted_id).unwrap();
	let rows = fixture.driver.rows("users");
	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0].get("_id"), Some(&inserted.inserted_id));
	assert_eq!(rows[0].get("name"), stored.get("name"));
	assert_eq!(fixture.dual.mirror_failures(), 0);

	// reads stay on the document backend
	let before = fixture.driver.statements().len();
	assert_eq!(fixture.dual.count(&Document::new()).await.unwrap(), 1);
	assert_eq!(fixture.driver.statements().len(), before);
}

#[tokio::test]
async fn test_mirrored_insert_many_shares_identities() {
	let fixture = fixture(MigrationTarget::MIRRORED).await;

	let inserted = fixture.dual.insert_many(&[doc(json!({"name": "a"})), doc(json!({"name": "b"}))]).await.unwrap();

	let ids: Vec<Value> = fixture.driver.rows("users").iter().filter_map(|row| row.get("_id").cloned()).collect();
	assert_eq!(ids, inserted.inserted_ids);
	for id in &inserted.inserted_ids {
		assert!(fixture.document.get(id).is_some());
	}
}

#[tokio::test]
async fn test_mirrored_upsert_shares_identity() {
	let fixture = fixture(MigrationTarget::MIRRORED).await;
	fixture.driver.respond_when(|query| query.sql.starts_with("UPDATE"), vec![]);
	fixture.driver.respond_when(|query| query.sql.contains("ON CONFLICT"), vec![doc(json!({"inserted": true}))]);

	let result = fixture
		.dual
		.update_one(&doc(json!({"name": "ada"})), &doc(json!({"$set": {"age": 36}})), &UpdateOptions::upsert())
		.await
		.unwrap();

	let id = result.upserted_id.unwrap();
	assert_eq!(fixture.document.get(&id).unwrap().get("age"), Some(&json!(36)));
	let upsert = fixture.driver.statements().into_iter().find(|query| query.sql.contains("ON CONFLICT")).unwrap();
	assert!(upsert.sql.starts_with(r#"INSERT INTO "users" ("_id", "name", "age")"#));
	assert_eq!(upsert.args[0], id);
	assert_eq!(fixture.dual.mirror_failures(), 0);
}

#[tokio::test]
async fn test_upsert_keeps_identity_from_selector() {
	let fixture = fixture(MigrationTarget::MIRRORED).await;
	fixture.driver.respond_when(|query| query.sql.starts_with("UPDATE"), vec![]);
	fixture.driver.respond_when(|query| query.sql.contains("ON CONFLICT"), vec![doc(json!({"inserted": true}))]);

	let result = fixture
		.dual
		.update_one(&doc(json!({"_id": "7"})), &doc(json!({"$set": {"name": "ada"}})), &UpdateOptions::upsert())
		.await
		.unwrap();

	assert_eq!(result.upserted_id, Some(json!("7")));
	let upsert = fixture.driver.statements().into_iter().find(|query| query.sql.contains("ON CONFLICT")).unwrap();
	assert_eq!(upsert.args[0], json!("7"));
}

#[tokio::test]
async fn test_relational_target_serves_from_relational_backend() {
	let fixture = fixture(MigrationTarget::RELATIONAL).await;

	fixture.dual.insert_one(&doc(json!({"_id": "1", "name": "ada"}))).await.unwrap();
	fixture.dual.insert_one(&doc(json!({"_id": "2", "name": "alan", "age": 41}))).await.unwrap();

	assert!(fixture.document.documents().is_empty());
	assert_eq!(fixture.dual.count(&Document::new()).await.unwrap(), 2);

	let found = fixture.dual.find(&doc(json!({"name": "ada"})), &FindOptions::default()).await.unwrap();
	// null columns read back as absent fields
	assert_eq!(found, vec![doc(json!({"_id": "1", "name": "ada"}))]);
}

#[tokio::test]
async fn test_failed_mirror_is_reported() {
	let fixture = fixture(MigrationTarget::MIRRORED).await;
	fixture.driver.fail_when(|query| query.sql.starts_with("INSERT"), "disk full");

	let err = fixture.dual.insert_one(&doc(json!({"_id": "1", "name": "ada"}))).await.unwrap_err();

	assert!(matches!(
		err,
		CollectionError::MirrorWrite {
			backend: Backend::Relational,
			operation: Operation::InsertOne,
			..
		}
	));
	assert!(fixture.document.get(&json!("1")).is_some());
	assert!(fixture.driver.rows("users").is_empty());
	assert_eq!(fixture.dual.mirror_failures(), 1);
}

#[tokio::test]
async fn test_canonical_failure_wins_over_mirror() {
	let fixture = fixture(MigrationTarget::MIRRORED).await;
	fixture.document.fail_next(Operation::InsertOne, "offline");

	let err = fixture.dual.insert_one(&doc(json!({"_id": "1"}))).await.unwrap_err();

	assert_eq!(err, CollectionError::backend(Backend::Document, "offline"));
	assert_eq!(fixture.dual.mirror_failures(), 0);
}

#[tokio::test]
async fn test_dispatch_follows_target() {
	let fixture = fixture(MigrationTarget::DOCUMENT).await;
	let dual = &fixture.dual;

	assert_eq!(
		dual.dispatch(Operation::InsertOne),
		Dispatch {
			canonical: Backend::Document,
			mirrors: &[],
		}
	);

	dual.set_target(MigrationTarget::MIRRORED);
	assert_eq!(dual.dispatch(Operation::Find).canonical, Backend::Document);
	assert!(dual.dispatch(Operation::Find).mirrors.is_empty());
	assert_eq!(
		dual.dispatch(Operation::DeleteMany),
		Dispatch {
			canonical: Backend::Document,
			mirrors: &[Backend::Relational],
		}
	);
	assert!(dual.dispatch(Operation::EnsureIndex).mirrors.is_empty());

	*dual.target_handle().write() = MigrationTarget::RELATIONAL;
	assert_eq!(dual.target(), MigrationTarget::RELATIONAL);
	assert_eq!(dual.dispatch(Operation::UpdateOne).canonical, Backend::Relational);
	assert_eq!(dual.dispatch(Operation::Count).canonical, Backend::Relational);
}
