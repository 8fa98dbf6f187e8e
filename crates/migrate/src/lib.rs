// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Live migration of a collection from the document backend to the relational one.
//!
//! Every process serving a collection runs a [`TargetWatcher`] that polls the
//! collection's row in the [`LockStore`] and applies the target it finds to its
//! [`DualCollection`](mongo2pg_collection::DualCollection). An operator runs the
//! [`Coordinator`], which copies the data across in several passes and moves the
//! target from `{document, document}` through `{document, both}` to
//! `{relational, relational}`, waiting for the live processes to acknowledge
//! each flip.

mod coordinator;
mod copy;
mod error;
mod lock;
mod watcher;

pub use coordinator::{Coordinator, CutoverConfig, CutoverStep};
pub use copy::{CopyFilter, copy_documents, created_at};
pub use error::{CutoverError, MigrateError};
pub use lock::{Acknowledgement, LockStore, SqlLockStore};
pub use watcher::{TargetWatcher, WatcherConfig};

pub type Result<T> = std::result::Result<T, MigrateError>;
