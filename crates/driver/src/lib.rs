// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The relational driver contract.
//!
//! Implementations wrap a PostgreSQL connection pool; the testing crate ships an
//! in-memory one. Statements arrive compiled, with `$n` placeholders bound to
//! the argument list.

mod error;
mod executor;

pub use error::DriverError;
pub use executor::{Driver, Executor, Transaction};
pub use mongo2pg_sql::Compiled;

/// One result row, keyed by column name.
pub type Row = mongo2pg_type::Document;

pub type Result<T> = std::result::Result<T, DriverError>;
