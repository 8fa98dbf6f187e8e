// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Document query compiler.
//!
//! Statements are built as a list of [`Atom`]s and compiled to PostgreSQL text
//! with `$n` placeholders plus the matching argument list:
//!
//! ```rust
//! use mongo2pg_sql::{SelectOptions, select};
//! use mongo2pg_type::{DataType, Relation};
//! use serde_json::json;
//!
//! let users = Relation::builder("users").field("age", DataType::Integer).build().unwrap();
//! let selector = json!({"age": {"$gte": 18}});
//! let statement = select(&users, selector.as_object().unwrap(), &SelectOptions::default()).unwrap();
//!
//! let compiled = statement.compile();
//! assert_eq!(compiled.sql, r#"SELECT "users".* FROM "users" WHERE "age" >= $1"#);
//! assert_eq!(compiled.args, vec![json!(18)]);
//! ```

pub mod aggregate;
mod atom;
pub mod ddl;
mod delete;
mod error;
pub mod expression;
mod field;
mod ident;
mod insert;
mod modifier;
mod select;
mod selector;
mod statement;
mod update;

pub use aggregate::aggregate;
pub use atom::{Atom, RelationRef};
pub use delete::{DeleteOptions, delete};
pub use error::SqlError;
pub use field::{FieldRef, Qualifier, Scope, resolve_field};
pub use ident::{quote_ident, quote_literal};
pub use insert::{Conflict, Insert, InsertOptions, UpsertCounts, UpsertOutcome, UpsertTarget, insert};
pub use modifier::{Assignment, assignments, flatten_modifier};
pub use select::{Lookup, Projected, SelectOptions, SelectParts, count, project, select, sort};
pub use selector::compile_selector;
pub use statement::{Compiled, Source, Statement};
pub use update::{UpdateOptions, update};

pub type Result<T> = std::result::Result<T, SqlError>;
