// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use async_trait::async_trait;
use indexmap::IndexMap;
use mongo2pg_collection::MigrationTarget;
use mongo2pg_migrate::{Acknowledgement, LockStore, Result};
use parking_lot::Mutex;

/// A [`LockStore`] held in memory that also remembers every target it was set to.
#[derive(Default)]
pub struct MemoryLockStore {
	targets: Mutex<IndexMap<String, MigrationTarget>>,
	acknowledgements: Mutex<IndexMap<(String, String), Acknowledgement>>,
	history: Mutex<Vec<(String, MigrationTarget)>>,
}

impl MemoryLockStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn target(&self, collection: &str) -> Option<MigrationTarget> {
		self.targets.lock().get(collection).copied()
	}

	/// Targets passed to `set` for `collection`, oldest first.
	pub fn history(&self, collection: &str) -> Vec<MigrationTarget> {
		self.history.lock().iter().filter(|(name, _)| name == collection).map(|(_, target)| *target).collect()
	}

	/// Stores an acknowledgement directly, as another process would.
	pub fn insert_acknowledgement(&self, acknowledgement: Acknowledgement) {
		let key = (acknowledgement.collection.clone(), acknowledgement.process_id.clone());
		self.acknowledgements.lock().insert(key, acknowledgement);
	}
}

#[async_trait]
impl LockStore for MemoryLockStore {
	async fn ensure(&self, collection: &str) -> Result<MigrationTarget> {
		Ok(*self.targets.lock().entry(collection.to_string()).or_insert(MigrationTarget::DOCUMENT))
	}

	async fn get(&self, collection: &str) -> Result<Option<MigrationTarget>> {
		Ok(self.target(collection))
	}

	async fn set(&self, collection: &str, target: MigrationTarget) -> Result<()> {
		self.targets.lock().insert(collection.to_string(), target);
		self.history.lock().push((collection.to_string(), target));
		Ok(())
	}

	async fn acknowledge(&self, acknowledgement: &Acknowledgement) -> Result<()> {
		self.insert_acknowledgement(acknowledgement.clone());
		Ok(())
	}

	async fn acknowledgements(&self, collection: &str) -> Result<Vec<Acknowledgement>> {
		Ok(self
			.acknowledgements
			.lock()
			.values()
			.filter(|acknowledgement| acknowledgement.collection == collection)
			.cloned()
			.collect())
	}
}
