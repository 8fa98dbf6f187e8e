// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
	#[error("relation '{relation}' declares field '{field}' twice")]
	DuplicateField {
		relation: String,
		field: String,
	},

	#[error("relation '{relation}' has no field '{field}' (referenced by {referenced_by})")]
	MissingField {
		relation: String,
		field: String,
		referenced_by: String,
	},

	#[error("relation name must not be empty")]
	EmptyName,
}
