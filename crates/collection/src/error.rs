// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use mongo2pg_driver::DriverError;
use mongo2pg_sql::SqlError;

use crate::{Backend, Operation};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollectionError {
	#[error(transparent)]
	Sql(#[from] SqlError),

	#[error(transparent)]
	Driver(#[from] DriverError),

	/// A backend other than the relational one failed.
	#[error("{backend} backend failed: {message}")]
	Backend {
		backend: Backend,
		message: String,
	},

	/// The canonical backend applied the write but a mirror did not. The two
	/// backends now disagree on the affected documents.
	#[error("{operation} succeeded but its mirror on the {backend} backend failed: {source}")]
	MirrorWrite {
		backend: Backend,
		operation: Operation,
		source: Box<CollectionError>,
	},

	#[error("unexpected result from {operation}: {message}")]
	UnexpectedResult {
		operation: Operation,
		message: String,
	},

	#[error("unknown migration target '{value}'")]
	UnknownTarget {
		value: String,
	},
}

impl CollectionError {
	pub fn backend(backend: Backend, message: impl Into<String>) -> Self {
		CollectionError::Backend {
			backend,
			message: message.into(),
		}
	}
}
