// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! In-memory stand-ins for the external stores, shared by the test suites.
//!
//! [`MemoryDriver`] interprets the SQL shapes the compiler emits, so a
//! relational collection can run without a server. [`MemoryDocumentCollection`]
//! plays the document backend and can inject concurrent writes between reads.

pub mod document;
pub mod driver;
pub mod lock;
pub mod util;

pub use document::MemoryDocumentCollection;
pub use driver::{MemoryDriver, MemoryTransaction, SyntaxError, Table};
pub use lock::MemoryLockStore;
pub use util::{compare_values, init_tracing, wait};
