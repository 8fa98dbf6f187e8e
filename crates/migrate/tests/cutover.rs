// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! End-to-end cutovers against the in-memory backends, with writes landing
//! while the copies run

use std::{sync::Arc, time::Duration};

use chrono::{TimeDelta, Utc};
use mongo2pg_collection::{Collection, DualCollection, FindOptions, MigrationTarget, Operation, RelationalCollection};
use mongo2pg_driver::Executor;
use mongo2pg_migrate::{
	Acknowledgement, Coordinator, CopyFilter, CutoverConfig, CutoverStep, LockStore, MigrateError, SqlLockStore,
	TargetWatcher, WatcherConfig, copy_documents, created_at,
};
use mongo2pg_sql::ddl::{CreateTableOptions, create_table};
use mongo2pg_testing::{MemoryDocumentCollection, MemoryDriver, MemoryLockStore, init_tracing, wait::wait_for};
use mongo2pg_type::{DataType, Document, IndexDef, Relation, Value};
use serde_json::json;

fn users() -> Relation {
	Relation::builder("users")
		.field("name", DataType::Text)
		.field("created", DataType::Timestamp)
		.index(IndexDef::new("users_name", &["name"]))
		.created_field("created")
		.build()
		.unwrap()
}

fn doc(value: Value) -> Document {
	value.as_object().unwrap().clone()
}

fn seeded(ids: &[&str]) -> MemoryDocumentCollection {
	MemoryDocumentCollection::new("users").with_documents(
		ids.iter().map(|id| doc(json!({"_id": id, "name": id, "created": "2020-01-01T00:00:00.000Z", "extra": 1}))),
	)
}

/// A write landing on the document backend at the current time.
fn write_now(id: &'static str) -> impl FnOnce(&mut Vec<Document>) + Send + 'static {
	move |documents| documents.push(doc(json!({"_id": id, "name": id, "created": created_at(Utc::now())})))
}

fn config() -> CutoverConfig {
	CutoverConfig::default()
		.with_poll_interval(Duration::from_millis(5))
		.with_confirm_timeout(Duration::from_secs(5))
		.with_copy_batch_size(2)
		.with_clock_skew_margin(Duration::ZERO)
}

fn ids(rows: &[Document]) -> Vec<String> {
	let mut ids: Vec<String> =
		rows.iter().filter_map(|row| row.get("_id").and_then(Value::as_str)).map(str::to_string).collect();
	ids.sort();
	ids
}

#[tokio::test]
async fn test_cutover_keeps_concurrent_writes() {
	init_tracing();
	let driver = MemoryDriver::new();
	let locks = Arc::new(SqlLockStore::new(Arc::new(driver.clone())).unwrap());
	locks.install().await.unwrap();

	let source = Arc::new(seeded(&["a", "b", "c", "d", "e"]));
	// "aa" sorts before the initial copy's position, "ab" arrives after the catch-up read
	source.after_find(1, write_now("aa"));
	source.after_find(4, write_now("ab"));

	let relational = Arc::new(RelationalCollection::new(Arc::new(driver.clone()), users()));
	let dual = Arc::new(DualCollection::new("users", source.clone(), relational));
	let watcher_config = WatcherConfig::default().with_poll_interval(Duration::from_millis(5));
	let mut watcher = TargetWatcher::new(watcher_config, locks.clone(), dual.clone());
	watcher.start();
	wait_for(|| watcher.polls() >= 1, "watcher should acknowledge").await;

	let coordinator = Coordinator::new(Arc::new(driver.clone()), locks.clone(), config());
	coordinator.cutover(source.as_ref(), &users()).await.unwrap();

	assert_eq!(ids(&driver.rows("users")), vec!["a", "aa", "ab", "b", "c", "d", "e"]);
	assert!(driver.rows("users").iter().all(|row| !row.contains_key("extra")));
	assert!(driver.table("users").unwrap().logged);
	assert_eq!(locks.get("users").await.unwrap(), Some(MigrationTarget::RELATIONAL));

	wait_for(|| !watcher.is_running(), "watcher should stop once migrated").await;
	assert_eq!(dual.target(), MigrationTarget::RELATIONAL);

	// served from the relational table from now on
	dual.insert_one(&doc(json!({"_id": "f", "name": "f"}))).await.unwrap();
	assert!(source.get(&json!("f")).is_none());
	assert_eq!(dual.count(&Document::new()).await.unwrap(), 8);
	let found = dual.find(&doc(json!({"name": "aa"})), &FindOptions::default()).await.unwrap();
	assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn test_cutover_walks_targets_in_order() {
	init_tracing();
	let driver = MemoryDriver::new();
	let locks = Arc::new(MemoryLockStore::new());
	let source = seeded(&["a"]);

	let coordinator = Coordinator::new(Arc::new(driver.clone()), locks.clone(), config());
	coordinator.cutover(&source, &users()).await.unwrap();

	assert_eq!(locks.history("users"), vec![MigrationTarget::MIRRORED, MigrationTarget::RELATIONAL]);
	assert_eq!(ids(&driver.rows("users")), vec!["a"]);
}

#[tokio::test]
async fn test_cutover_requires_document_target() {
	init_tracing();
	let driver = MemoryDriver::new();
	let locks = Arc::new(MemoryLockStore::new());
	locks.set("users", MigrationTarget::MIRRORED).await.unwrap();

	let coordinator = Coordinator::new(Arc::new(driver.clone()), locks.clone(), config());
	let err = coordinator.cutover(&seeded(&["a"]), &users()).await.unwrap_err();

	assert_eq!(err.step, CutoverStep::Precondition);
	assert!(!err.reverted);
	assert!(matches!(err.source, MigrateError::NotOnDocument { .. }));
	assert_eq!(locks.target("users"), Some(MigrationTarget::MIRRORED));
	assert!(driver.statements().is_empty());
}

#[tokio::test]
async fn test_failed_create_leaves_no_table() {
	init_tracing();
	let driver = MemoryDriver::new();
	let locks = Arc::new(MemoryLockStore::new());
	driver.fail_once(|query| query.sql.starts_with("CREATE UNLOGGED TABLE"), "permission denied");

	let coordinator = Coordinator::new(Arc::new(driver.clone()), locks.clone(), config());
	let err = coordinator.cutover(&seeded(&["a"]), &users()).await.unwrap_err();

	assert_eq!(err.step, CutoverStep::CreateTable);
	assert!(err.reverted);
	assert!(driver.table("users").is_none());
	assert_eq!(locks.target("users"), Some(MigrationTarget::DOCUMENT));
	assert!(locks.history("users").iter().all(|target| *target == MigrationTarget::DOCUMENT));
}

#[tokio::test]
async fn test_failed_initial_copy_rolls_back() {
	init_tracing();
	let driver = MemoryDriver::new();
	let locks = Arc::new(MemoryLockStore::new());
	let source = seeded(&["a", "b", "c"]);
	source.fail_next(Operation::Find, "cursor killed");

	let coordinator = Coordinator::new(Arc::new(driver.clone()), locks.clone(), config());
	let err = coordinator.cutover(&source, &users()).await.unwrap_err();

	assert_eq!(err.step, CutoverStep::InitialCopy);
	assert!(err.reverted);
	assert!(driver.table("users").is_none());
}

#[tokio::test]
async fn test_unconfirmed_flip_reverts_to_document() {
	init_tracing();
	let driver = MemoryDriver::new();
	let locks = Arc::new(MemoryLockStore::new());
	// a live process that never moves past the document target
	locks.insert_acknowledgement(Acknowledgement {
		collection: "users".to_string(),
		process_id: "stuck".to_string(),
		target: MigrationTarget::DOCUMENT,
		observed_at: Utc::now() + TimeDelta::minutes(10),
	});

	let config = config().with_confirm_timeout(Duration::from_millis(30));
	let coordinator = Coordinator::new(Arc::new(driver.clone()), locks.clone(), config);
	let err = coordinator.cutover(&seeded(&["a"]), &users()).await.unwrap_err();

	assert_eq!(err.step, CutoverStep::MirrorWrites);
	assert!(err.reverted);
	assert!(matches!(
		err.source,
		MigrateError::Unconfirmed {
			pending: 1,
			..
		}
	));
	assert_eq!(locks.history("users"), vec![MigrationTarget::MIRRORED, MigrationTarget::DOCUMENT]);
}

#[tokio::test]
async fn test_stale_processes_do_not_block_confirmation() {
	init_tracing();
	let driver = MemoryDriver::new();
	let locks = Arc::new(MemoryLockStore::new());
	locks.insert_acknowledgement(Acknowledgement {
		collection: "users".to_string(),
		process_id: "gone".to_string(),
		target: MigrationTarget::DOCUMENT,
		observed_at: Utc::now() - TimeDelta::minutes(10),
	});

	let coordinator = Coordinator::new(Arc::new(driver), locks, config());
	coordinator.confirm("users", MigrationTarget::MIRRORED).await.unwrap();
}

#[tokio::test]
async fn test_copy_since_skips_older_documents() {
	init_tracing();
	let driver = MemoryDriver::new();
	driver.none(&create_table(&users(), CreateTableOptions::default()).compile()).await.unwrap();

	let source = seeded(&["old"]).with_documents([doc(json!({"_id": "new", "created": "2030-01-01T00:00:00.000Z"}))]);
	let since = "2029-12-31T00:00:00Z".parse().unwrap();
	let copied = copy_documents(&source, &driver, &users(), CopyFilter::CreatedSince(since), 10).await.unwrap();

	assert_eq!(copied, 1);
	assert_eq!(ids(&driver.rows("users")), vec!["new"]);

	// a second pass overlaps without duplicating
	let copied = copy_documents(&source, &driver, &users(), CopyFilter::All, 10).await.unwrap();
	assert_eq!(copied, 1);
	assert_eq!(ids(&driver.rows("users")), vec!["new", "old"]);
}
