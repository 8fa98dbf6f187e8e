// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The document collection surface.
//!
//! [`Collection`] is implemented by each physical backend. [`RelationalCollection`]
//! compiles every call to SQL and runs it on a [`Driver`](mongo2pg_driver::Driver);
//! [`DualCollection`] fronts a document and a relational backend and routes each
//! [`Operation`] according to the current [`MigrationTarget`].

mod collection;
mod dual;
mod error;
mod operation;
mod options;
mod relational;
mod target;

pub use collection::Collection;
pub use dual::{Dispatch, DualCollection};
pub use error::CollectionError;
pub use operation::{Operation, Route};
pub use options::{DeleteResult, FindOptions, InsertManyResult, InsertOneResult, UpdateOptions, UpdateResult};
pub use relational::{RelationalCollection, row_to_document};
pub use target::{Backend, MigrationTarget, ReadTarget, WriteTarget};

pub type Result<T> = std::result::Result<T, CollectionError>;
