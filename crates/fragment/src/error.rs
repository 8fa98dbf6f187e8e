// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use mongo2pg_sql::SqlError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FragmentError {
	#[error(transparent)]
	Sql(#[from] SqlError),

	#[error("unknown fragment '{name}'")]
	UnknownFragment {
		name: String,
	},

	#[error("fragment '{name}' spreads itself")]
	RecursiveSpread {
		name: String,
	},

	#[error("fragment '{fragment}' selects from '{expected}' but was spread into '{relation}'")]
	RelationMismatch {
		fragment: String,
		expected: String,
		relation: String,
	},

	#[error("field '{field}' of '{relation}' links to another relation and needs a selection")]
	MissingSelection {
		relation: String,
		field: String,
	},

	#[error("output key '{key}' collides with another selected field")]
	KeyCollision {
		key: String,
	},

	#[error("field '{field}' of '{relation}' is not a link")]
	NotALink {
		relation: String,
		field: String,
	},
}
