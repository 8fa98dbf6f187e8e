// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use mongo2pg_sql::Compiled;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
	/// The database rejected a statement. Carries what was sent so the failure
	/// can be reproduced.
	#[error("{message} (sql: {sql}, args: {args:?})")]
	Execution {
		sql: String,
		args: Vec<Value>,
		message: String,
	},

	#[error("expected {expected} row(s) but got {actual} (sql: {sql})")]
	UnexpectedRowCount {
		sql: String,
		expected: String,
		actual: usize,
	},

	#[error("transaction failed to {action}: {message}")]
	Transaction {
		action: String,
		message: String,
	},

	#[error("connection error: {message}")]
	Connection {
		message: String,
	},
}

impl DriverError {
	pub fn execution(query: &Compiled, message: impl Into<String>) -> Self {
		DriverError::Execution {
			sql: query.sql.clone(),
			args: query.args.clone(),
			message: message.into(),
		}
	}

	pub fn unexpected_row_count(query: &Compiled, expected: impl Into<String>, actual: usize) -> Self {
		DriverError::UnexpectedRowCount {
			sql: query.sql.clone(),
			expected: expected.into(),
			actual,
		}
	}
}
