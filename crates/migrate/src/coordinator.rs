// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	fmt::{Display, Formatter},
	sync::Arc,
	time::{Duration, Instant},
};

use chrono::{DateTime, TimeDelta, Utc};
use mongo2pg_collection::{Collection, MigrationTarget};
use mongo2pg_driver::{Driver, Executor};
use mongo2pg_sql::ddl::{CreateTableOptions, create_indexes, create_table, drop_table, set_logged};
use mongo2pg_type::Relation;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::{CopyFilter, CutoverError, LockStore, MigrateError, Result, copy_documents};

/// Configuration for a cutover
#[derive(Debug, Clone)]
pub struct CutoverConfig {
	/// How often acknowledgements are re-read while confirming a flip
	pub poll_interval: Duration,
	/// Processes that have not acknowledged within this window count as gone
	pub liveness_window: Duration,
	/// How long a flip may go unconfirmed before the cutover fails
	pub confirm_timeout: Duration,
	/// Documents read and inserted per copy round trip
	pub copy_batch_size: u64,
	/// Subtracted from copy cut points to absorb clock differences between
	/// the writers' hosts and this one
	pub clock_skew_margin: Duration,
}

impl CutoverConfig {
	pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval;
		self
	}

	pub fn with_liveness_window(mut self, liveness_window: Duration) -> Self {
		self.liveness_window = liveness_window;
		self
	}

	pub fn with_confirm_timeout(mut self, confirm_timeout: Duration) -> Self {
		self.confirm_timeout = confirm_timeout;
		self
	}

	pub fn with_copy_batch_size(mut self, copy_batch_size: u64) -> Self {
		self.copy_batch_size = copy_batch_size;
		self
	}

	pub fn with_clock_skew_margin(mut self, clock_skew_margin: Duration) -> Self {
		self.clock_skew_margin = clock_skew_margin;
		self
	}
}

impl Default for CutoverConfig {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_secs(1),
			liveness_window: Duration::from_secs(30),
			confirm_timeout: Duration::from_secs(60),
			copy_batch_size: 1000,
			clock_skew_margin: Duration::from_secs(5),
		}
	}
}

/// The steps of a cutover, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CutoverStep {
	Precondition,
	CreateTable,
	InitialCopy,
	RestoreLogging,
	CatchUpCopy,
	MirrorWrites,
	FinalCopy,
	SwitchToRelational,
}

impl CutoverStep {
	pub const ALL: [CutoverStep; 8] = [
		CutoverStep::Precondition,
		CutoverStep::CreateTable,
		CutoverStep::InitialCopy,
		CutoverStep::RestoreLogging,
		CutoverStep::CatchUpCopy,
		CutoverStep::MirrorWrites,
		CutoverStep::FinalCopy,
		CutoverStep::SwitchToRelational,
	];

	/// 1-based position.
	pub fn number(&self) -> usize {
		*self as usize + 1
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			CutoverStep::Precondition => "precondition",
			CutoverStep::CreateTable => "create table",
			CutoverStep::InitialCopy => "initial copy",
			CutoverStep::RestoreLogging => "restore logging",
			CutoverStep::CatchUpCopy => "catch-up copy",
			CutoverStep::MirrorWrites => "mirror writes",
			CutoverStep::FinalCopy => "final copy",
			CutoverStep::SwitchToRelational => "switch to relational",
		}
	}
}

impl Display for CutoverStep {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} ({})", self.number(), self.as_str())
	}
}

fn before(instant: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
	TimeDelta::from_std(span)
		.ok()
		.and_then(|delta| instant.checked_sub_signed(delta))
		.unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Moves collections from the document backend to the relational one while
/// they keep serving traffic.
///
/// Run from an operator tool, one collection at a time. Serving processes
/// follow along through their [`TargetWatcher`](crate::TargetWatcher)s.
pub struct Coordinator<D: Driver, L: LockStore> {
	driver: Arc<D>,
	locks: Arc<L>,
	config: CutoverConfig,
}

impl<D: Driver + 'static, L: LockStore + 'static> Coordinator<D, L> {
	pub fn new(driver: Arc<D>, locks: Arc<L>, config: CutoverConfig) -> Self {
		Self {
			driver,
			locks,
			config,
		}
	}

	pub fn config(&self) -> &CutoverConfig {
		&self.config
	}

	/// Migrates the collection stored in `source` into `relation`'s table.
	///
	/// On failure the lock goes back to `{document, document}`, except when the
	/// collection was not at `{document, document}` to begin with. Whatever the
	/// failed run copied is dropped by the next run.
	#[instrument(name = "migrate::cutover", level = "info", skip_all, fields(collection = %relation.name()))]
	pub async fn cutover(&self, source: &dyn Collection, relation: &Relation) -> std::result::Result<(), CutoverError> {
		let collection = relation.name();
		let Err((step, cause)) = self.run(source, relation).await else {
			info!("cutover complete");
			return Ok(());
		};
		error!(%step, %cause, "cutover failed");

		let reverted = if step == CutoverStep::Precondition {
			false
		} else {
			match self.locks.set(collection, MigrationTarget::DOCUMENT).await {
				Ok(()) => {
					warn!("lock reverted to {}", MigrationTarget::DOCUMENT);
					true
				}
				Err(revert) => {
					error!(%revert, "failed to revert the lock");
					false
				}
			}
		};

		Err(CutoverError {
			collection: collection.to_string(),
			step,
			source: cause,
			reverted,
		})
	}

	async fn run(
		&self,
		source: &dyn Collection,
		relation: &Relation,
	) -> std::result::Result<(), (CutoverStep, MigrateError)> {
		let collection = relation.name();
		let at = |step: CutoverStep| move |error: MigrateError| (step, error);

		let target = self.locks.ensure(collection).await.map_err(at(CutoverStep::Precondition))?;
		if target != MigrationTarget::DOCUMENT {
			return Err((
				CutoverStep::Precondition,
				MigrateError::NotOnDocument {
					collection: collection.to_string(),
					target,
				},
			));
		}

		let initial_cut = Utc::now();
		self.create_and_copy(source, relation).await?;

		debug!("step {}", CutoverStep::RestoreLogging);
		self.driver
			.none(&set_logged(collection).compile())
			.await
			.map_err(|error| (CutoverStep::RestoreLogging, MigrateError::from(error)))?;

		let catch_up_cut = Utc::now();
		self.copy(source, relation, CutoverStep::CatchUpCopy, initial_cut).await?;

		debug!("step {}", CutoverStep::MirrorWrites);
		self.flip(collection, MigrationTarget::MIRRORED).await.map_err(at(CutoverStep::MirrorWrites))?;

		self.copy(source, relation, CutoverStep::FinalCopy, catch_up_cut).await?;

		debug!("step {}", CutoverStep::SwitchToRelational);
		self.flip(collection, MigrationTarget::RELATIONAL).await.map_err(at(CutoverStep::SwitchToRelational))?;
		Ok(())
	}

	/// Recreates the table unlogged and copies every document into it, in one
	/// transaction.
	async fn create_and_copy(
		&self,
		source: &dyn Collection,
		relation: &Relation,
	) -> std::result::Result<(), (CutoverStep, MigrateError)> {
		let transaction = self
			.driver
			.begin()
			.await
			.map_err(|error| (CutoverStep::CreateTable, MigrateError::from(error)))?;

		let mut step = CutoverStep::CreateTable;
		debug!("step {step}");
		let result: Result<u64> = async {
			transaction.none(&drop_table(relation.name()).compile()).await?;
			let options = CreateTableOptions {
				unlogged: true,
				if_not_exists: false,
			};
			transaction.none(&create_table(relation, options).compile()).await?;
			for index in create_indexes(relation)? {
				transaction.none(&index.compile()).await?;
			}

			step = CutoverStep::InitialCopy;
			debug!("step {step}");
			copy_documents(source, transaction.as_ref(), relation, CopyFilter::All, self.config.copy_batch_size)
				.await
		}
		.await;

		match result {
			Ok(copied) => {
				transaction.commit().await.map_err(|error| (step, MigrateError::from(error)))?;
				debug!(copied, "initial copy committed");
				Ok(())
			}
			Err(error) => {
				if let Err(rollback) = transaction.rollback().await {
					error!(%rollback, "rollback failed");
				}
				Err((step, error))
			}
		}
	}

	async fn copy(
		&self,
		source: &dyn Collection,
		relation: &Relation,
		step: CutoverStep,
		since: DateTime<Utc>,
	) -> std::result::Result<u64, (CutoverStep, MigrateError)> {
		debug!(%since, "step {step}");
		let filter = CopyFilter::CreatedSince(before(since, self.config.clock_skew_margin));
		copy_documents(source, self.driver.as_ref(), relation, filter, self.config.copy_batch_size)
			.await
			.map_err(|error| (step, error))
	}

	/// Stores `target` and waits until every live process has acknowledged it.
	async fn flip(&self, collection: &str, target: MigrationTarget) -> Result<()> {
		self.locks.set(collection, target).await?;
		self.confirm(collection, target).await
	}

	/// Re-reads acknowledgements until every process seen within the liveness
	/// window reports `target`. No live process at all counts as confirmed.
	#[instrument(name = "migrate::confirm", level = "debug", skip(self, target), fields(%target))]
	pub async fn confirm(&self, collection: &str, target: MigrationTarget) -> Result<()> {
		let started = Instant::now();
		loop {
			let acknowledgements = self.locks.acknowledgements(collection).await?;
			let horizon = before(Utc::now(), self.config.liveness_window);
			let pending = acknowledgements
				.iter()
				.filter(|ack| ack.observed_at >= horizon && ack.target != target)
				.count();

			if pending == 0 {
				debug!(waited = ?started.elapsed(), "confirmed");
				return Ok(());
			}

			let waited = started.elapsed();
			if waited >= self.config.confirm_timeout {
				return Err(MigrateError::Unconfirmed {
					collection: collection.to_string(),
					target,
					pending,
					waited,
				});
			}
			sleep(self.config.poll_interval).await;
		}
	}
}
