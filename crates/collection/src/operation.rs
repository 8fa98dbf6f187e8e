// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::fmt::{Display, Formatter};

/// Every call a [`Collection`](crate::Collection) accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
	Find,
	FindOne,
	Count,
	Aggregate,
	InsertOne,
	InsertMany,
	UpdateOne,
	UpdateMany,
	DeleteOne,
	DeleteMany,
	EnsureIndex,
}

/// Which backends of a dual collection an operation goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
	/// The read target.
	Read,
	/// Every backend of the write target.
	Write,
	/// Neither a read nor a write; follows the read target.
	Other,
}

impl Operation {
	pub const ALL: [Operation; 11] = [
		Operation::Find,
		Operation::FindOne,
		Operation::Count,
		Operation::Aggregate,
		Operation::InsertOne,
		Operation::InsertMany,
		Operation::UpdateOne,
		Operation::UpdateMany,
		Operation::DeleteOne,
		Operation::DeleteMany,
		Operation::EnsureIndex,
	];

	pub fn route(self) -> Route {
		match self {
			Operation::Find | Operation::FindOne | Operation::Count | Operation::Aggregate => Route::Read,
			Operation::InsertOne
			| Operation::InsertMany
			| Operation::UpdateOne
			| Operation::UpdateMany
			| Operation::DeleteOne
			| Operation::DeleteMany => Route::Write,
			Operation::EnsureIndex => Route::Other,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Operation::Find => "find",
			Operation::FindOne => "find_one",
			Operation::Count => "count",
			Operation::Aggregate => "aggregate",
			Operation::InsertOne => "insert_one",
			Operation::InsertMany => "insert_many",
			Operation::UpdateOne => "update_one",
			Operation::UpdateMany => "update_many",
			Operation::DeleteOne => "delete_one",
			Operation::DeleteMany => "delete_many",
			Operation::EnsureIndex => "ensure_index",
		}
	}
}

impl Display for Operation {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_routes() {
		let reads: Vec<_> = Operation::ALL.into_iter().filter(|o| o.route() == Route::Read).collect();
		let writes: Vec<_> = Operation::ALL.into_iter().filter(|o| o.route() == Route::Write).collect();
		assert_eq!(reads, vec![Operation::Find, Operation::FindOne, Operation::Count, Operation::Aggregate]);
		assert_eq!(writes.len(), 6);
		assert_eq!(Operation::EnsureIndex.route(), Route::Other);
	}
}
