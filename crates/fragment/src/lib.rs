// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Fragment compiler.
//!
//! A fragment is a named, possibly nested field selection over a relation. It
//! compiles to one `jsonb` expression per base row plus the joins the
//! expression reads from, so a single select returns documents of the
//! requested shape.

mod compile;
mod entry;
mod error;
mod schema;

pub use compile::{CodeResolver, CompiledFragment, OUTPUT_COLUMN, compile_fragment};
pub use entry::{Entry, Fragment, FragmentSource};
pub use error::FragmentError;
pub use schema::{Link, Resolver, Schema};

pub type Result<T> = std::result::Result<T, FragmentError>;
