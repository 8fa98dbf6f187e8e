// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The SQL lock store against the in-memory driver, and the target watcher

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use mongo2pg_collection::{CollectionError, DualCollection, MigrationTarget};
use mongo2pg_migrate::{Acknowledgement, LockStore, MigrateError, SqlLockStore, TargetWatcher, WatcherConfig};
use mongo2pg_sql::ddl::{LOCK_ACK_TABLE, LOCK_TABLE};
use mongo2pg_testing::{MemoryDocumentCollection, MemoryDriver, MemoryLockStore, init_tracing, wait::wait_for};
use serde_json::json;

async fn store() -> (MemoryDriver, SqlLockStore<MemoryDriver>) {
	init_tracing();
	let driver = MemoryDriver::new();
	let store = SqlLockStore::new(Arc::new(driver.clone())).unwrap();
	store.install().await.unwrap();
	(driver, store)
}

fn at(timestamp: &str) -> DateTime<Utc> {
	timestamp.parse().unwrap()
}

fn acknowledgement(collection: &str, process_id: &str, target: MigrationTarget, observed_at: &str) -> Acknowledgement {
	Acknowledgement {
		collection: collection.to_string(),
		process_id: process_id.to_string(),
		target,
		observed_at: at(observed_at),
	}
}

#[tokio::test]
async fn test_install_is_idempotent() {
	let (driver, store) = store().await;
	store.install().await.unwrap();

	assert!(driver.table(LOCK_TABLE).is_some());
	assert_eq!(driver.table(LOCK_ACK_TABLE).unwrap().primary_key, vec!["collection_name", "process_id"]);
}

#[tokio::test]
async fn test_ensure_creates_row_once() {
	let (driver, store) = store().await;

	assert_eq!(store.get("users").await.unwrap(), None);
	assert_eq!(store.ensure("users").await.unwrap(), MigrationTarget::DOCUMENT);
	assert_eq!(store.get("users").await.unwrap(), Some(MigrationTarget::DOCUMENT));

	store.set("users", MigrationTarget::MIRRORED).await.unwrap();
	assert_eq!(store.ensure("users").await.unwrap(), MigrationTarget::MIRRORED);
	assert_eq!(driver.rows(LOCK_TABLE).len(), 1);
}

#[tokio::test]
async fn test_set_overwrites_target() {
	let (driver, store) = store().await;

	store.set("users", MigrationTarget::MIRRORED).await.unwrap();
	store.set("users", MigrationTarget::RELATIONAL).await.unwrap();
	store.set("orders", MigrationTarget::DOCUMENT).await.unwrap();

	assert_eq!(store.get("users").await.unwrap(), Some(MigrationTarget::RELATIONAL));
	assert_eq!(store.get("orders").await.unwrap(), Some(MigrationTarget::DOCUMENT));
	let rows = driver.rows(LOCK_TABLE);
	assert_eq!(rows.len(), 2);
	assert_eq!(rows[0].get("read_target"), Some(&json!("relational")));
	assert_eq!(rows[0].get("write_target"), Some(&json!("relational")));
}

#[tokio::test]
async fn test_acknowledgements_replace_per_process() {
	let (_driver, store) = store().await;

	store.acknowledge(&acknowledgement("users", "p1", MigrationTarget::DOCUMENT, "2025-03-01T12:00:00Z"))
		.await
		.unwrap();
	store.acknowledge(&acknowledgement("users", "p1", MigrationTarget::MIRRORED, "2025-03-01T12:00:01.250Z"))
		.await
		.unwrap();
	store.acknowledge(&acknowledgement("users", "p2", MigrationTarget::DOCUMENT, "2025-03-01T12:00:02Z"))
		.await
		.unwrap();
	store.acknowledge(&acknowledgement("orders", "p1", MigrationTarget::RELATIONAL, "2025-03-01T12:00:03Z"))
		.await
		.unwrap();

	let acknowledgements = store.acknowledgements("users").await.unwrap();
	assert_eq!(
		acknowledgements,
		vec![
			acknowledgement("users", "p1", MigrationTarget::MIRRORED, "2025-03-01T12:00:01.250Z"),
			acknowledgement("users", "p2", MigrationTarget::DOCUMENT, "2025-03-01T12:00:02Z"),
		]
	);
}

#[tokio::test]
async fn test_unknown_stored_target_is_an_error() {
	let (driver, store) = store().await;
	let row = json!({"collection_name": "users", "read_target": "sideways", "write_target": "document"});
	driver.respond_when(|query| query.sql.starts_with("SELECT"), vec![row.as_object().unwrap().clone()]);

	let err = store.get("users").await.unwrap_err();
	assert_eq!(
		err,
		MigrateError::Collection(CollectionError::UnknownTarget {
			value: "sideways".to_string()
		})
	);
}

fn dual() -> Arc<DualCollection> {
	let document = Arc::new(MemoryDocumentCollection::new("users"));
	let relational = Arc::new(MemoryDocumentCollection::new("users"));
	Arc::new(DualCollection::new("users", document, relational))
}

#[tokio::test]
async fn test_poll_once_applies_and_acknowledges() {
	init_tracing();
	let locks = Arc::new(MemoryLockStore::new());
	let collection = dual();
	let watcher = TargetWatcher::new(WatcherConfig::default().with_process_id("p1"), locks.clone(), collection.clone());

	assert_eq!(watcher.poll_once().await.unwrap(), MigrationTarget::DOCUMENT);
	assert_eq!(locks.target("users"), Some(MigrationTarget::DOCUMENT));

	locks.set("users", MigrationTarget::MIRRORED).await.unwrap();
	assert_eq!(watcher.poll_once().await.unwrap(), MigrationTarget::MIRRORED);
	assert_eq!(collection.target(), MigrationTarget::MIRRORED);

	let acknowledgements = locks.acknowledgements("users").await.unwrap();
	assert_eq!(acknowledgements.len(), 1);
	assert_eq!(acknowledgements[0].process_id, "p1");
	assert_eq!(acknowledgements[0].target, MigrationTarget::MIRRORED);
}

#[tokio::test]
async fn test_watcher_stops_once_migrated() {
	init_tracing();
	let locks = Arc::new(MemoryLockStore::new());
	let collection = dual();
	let config = WatcherConfig::default().with_poll_interval(Duration::from_millis(5));
	let mut watcher = TargetWatcher::new(config, locks.clone(), collection.clone());

	watcher.start();
	assert!(watcher.is_running());
	wait_for(|| watcher.polls() >= 2, "watcher should poll").await;
	assert_eq!(collection.target(), MigrationTarget::DOCUMENT);

	locks.set("users", MigrationTarget::RELATIONAL).await.unwrap();
	wait_for(|| !watcher.is_running(), "watcher should stop after the final target").await;
	assert_eq!(collection.target(), MigrationTarget::RELATIONAL);

	let polls = watcher.polls();
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert_eq!(watcher.polls(), polls);
}

#[tokio::test]
async fn test_stopped_watcher_no_longer_polls() {
	let locks = Arc::new(MemoryLockStore::new());
	let config = WatcherConfig::default().with_poll_interval(Duration::from_millis(5));
	let mut watcher = TargetWatcher::new(config, locks.clone(), dual());

	watcher.start();
	wait_for(|| watcher.polls() >= 1, "watcher should poll").await;
	watcher.stop();
	assert!(!watcher.is_running());

	let polls = watcher.polls();
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert_eq!(watcher.polls(), polls);
}
