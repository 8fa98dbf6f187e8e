// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicU64, Ordering},
	},
	time::Duration,
};

use chrono::Utc;
use mongo2pg_collection::{Collection, DualCollection, MigrationTarget};
use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, error};
use uuid::Uuid;

use crate::{Acknowledgement, LockStore, Result};

/// Configuration for a target watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
	/// Identifies this process in acknowledgements
	pub process_id: String,
	/// How often to read the lock
	pub poll_interval: Duration,
}

impl WatcherConfig {
	pub fn new(process_id: impl Into<String>, poll_interval: Duration) -> Self {
		Self {
			process_id: process_id.into(),
			poll_interval,
		}
	}

	pub fn with_process_id(mut self, process_id: impl Into<String>) -> Self {
		self.process_id = process_id.into();
		self
	}

	pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval;
		self
	}
}

impl Default for WatcherConfig {
	fn default() -> Self {
		Self {
			process_id: Uuid::new_v4().to_string(),
			poll_interval: Duration::from_secs(1),
		}
	}
}

/// Keeps one process's dual collection on the target the lock holds.
///
/// Each poll reads the collection's lock row, creating it if missing, applies
/// the target and acknowledges it. Polling ends once the collection is fully
/// migrated; going back requires a restart.
pub struct TargetWatcher<L: LockStore> {
	locks: Arc<L>,
	collection: Arc<DualCollection>,
	config: WatcherConfig,
	state: Arc<WatcherState>,
	worker: Option<JoinHandle<()>>,
}

struct WatcherState {
	running: AtomicBool,
	polls: AtomicU64,
}

impl<L: LockStore + 'static> TargetWatcher<L> {
	pub fn new(config: WatcherConfig, locks: Arc<L>, collection: Arc<DualCollection>) -> Self {
		Self {
			locks,
			collection,
			config,
			state: Arc::new(WatcherState {
				running: AtomicBool::new(false),
				polls: AtomicU64::new(0),
			}),
			worker: None,
		}
	}

	/// Reads the lock once, applies the target and acknowledges it.
	pub async fn poll_once(&self) -> Result<MigrationTarget> {
		Self::poll(self.locks.as_ref(), &self.collection, &self.config.process_id).await
	}

	async fn poll(locks: &L, collection: &DualCollection, process_id: &str) -> Result<MigrationTarget> {
		let name = collection.name();
		let target = match locks.get(name).await? {
			Some(target) => target,
			None => locks.ensure(name).await?,
		};
		collection.set_target(target);

		locks.acknowledge(&Acknowledgement {
			collection: name.to_string(),
			process_id: process_id.to_string(),
			target,
			observed_at: Utc::now(),
		})
		.await?;
		Ok(target)
	}

	async fn polling_loop(
		config: WatcherConfig,
		locks: Arc<L>,
		collection: Arc<DualCollection>,
		state: Arc<WatcherState>,
	) {
		debug!(
			"[Watcher {}] Started polling '{}' with interval {:?}",
			config.process_id,
			collection.name(),
			config.poll_interval
		);

		while state.running.load(Ordering::Acquire) {
			state.polls.fetch_add(1, Ordering::Relaxed);
			match Self::poll(locks.as_ref(), &collection, &config.process_id).await {
				Ok(target) if target.is_migrated() => {
					debug!("[Watcher {}] '{}' is fully migrated", config.process_id, collection.name());
					state.running.store(false, Ordering::Release);
					break;
				}
				Ok(_) => {}
				Err(error) => {
					error!("[Watcher {}] Error polling '{}': {}", config.process_id, collection.name(), error);
				}
			}
			sleep(config.poll_interval).await;
		}

		debug!("[Watcher {}] Stopped", config.process_id);
	}

	pub fn start(&mut self) {
		if self.state.running.swap(true, Ordering::AcqRel) {
			return;
		}

		let locks = Arc::clone(&self.locks);
		let collection = Arc::clone(&self.collection);
		let state = Arc::clone(&self.state);
		let config = self.config.clone();

		self.worker = Some(tokio::spawn(Self::polling_loop(config, locks, collection, state)));
	}

	pub fn stop(&mut self) {
		self.state.running.store(false, Ordering::Release);
		if let Some(worker) = self.worker.take() {
			worker.abort();
		}
	}

	/// False before `start`, after `stop`, and once the collection is fully migrated.
	pub fn is_running(&self) -> bool {
		self.state.running.load(Ordering::Acquire)
	}

	pub fn polls(&self) -> u64 {
		self.state.polls.load(Ordering::Relaxed)
	}

	pub fn process_id(&self) -> &str {
		&self.config.process_id
	}
}

impl<L: LockStore> Drop for TargetWatcher<L> {
	fn drop(&mut self) {
		if let Some(worker) = self.worker.take() {
			worker.abort();
		}
	}
}
