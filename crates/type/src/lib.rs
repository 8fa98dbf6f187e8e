// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Shared data model for mongo2pg.
//!
//! - [`DataType`]: relational storage types, including the not-null and default wrappers
//! - [`Relation`]: a named, ordered field map with identity, indexes and creation-time field
//! - [`ValueKind`]: the runtime kind of a document value, used for cast hints
//! - [`Catalog`]: name lookup for relations referenced by other relations

mod catalog;
mod data_type;
mod error;
mod relation;
mod value;

pub use catalog::Catalog;
pub use data_type::DataType;
pub use error::TypeError;
pub use relation::{IndexDef, Relation, RelationBuilder};
pub use serde_json::{Map, Value};
pub use value::{ValueKind, is_operator_key};

/// A document as stored by the document backend, and a row as returned by the relational backend.
pub type Document = Map<String, Value>;

pub type Result<T> = std::result::Result<T, TypeError>;
