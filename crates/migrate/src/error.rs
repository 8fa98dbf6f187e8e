// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::time::Duration;

use mongo2pg_collection::{CollectionError, MigrationTarget};
use mongo2pg_driver::DriverError;
use mongo2pg_sql::SqlError;
use mongo2pg_type::TypeError;

use crate::CutoverStep;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MigrateError {
	#[error(transparent)]
	Type(#[from] TypeError),

	#[error(transparent)]
	Sql(#[from] SqlError),

	#[error(transparent)]
	Driver(#[from] DriverError),

	#[error(transparent)]
	Collection(#[from] CollectionError),

	/// Cutover only starts from a collection that has not been touched yet.
	#[error("collection '{collection}' is at {target}, expected {{read: document, write: document}}")]
	NotOnDocument {
		collection: String,
		target: MigrationTarget,
	},

	#[error("{pending} live process(es) had not observed {target} for '{collection}' after {waited:?}")]
	Unconfirmed {
		collection: String,
		target: MigrationTarget,
		pending: usize,
		waited: Duration,
	},

	#[error("malformed lock row for '{collection}': {message}")]
	MalformedLock {
		collection: String,
		message: String,
	},
}

impl MigrateError {
	pub fn malformed_lock(collection: &str, message: impl Into<String>) -> Self {
		MigrateError::MalformedLock {
			collection: collection.to_string(),
			message: message.into(),
		}
	}
}

/// A failed cutover: the step that failed and whether the lock went back to
/// `{document, document}`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cutover of '{collection}' failed at step {step}: {source}")]
pub struct CutoverError {
	pub collection: String,
	pub step: CutoverStep,
	pub source: MigrateError,
	pub reverted: bool,
}
