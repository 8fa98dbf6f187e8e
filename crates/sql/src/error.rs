// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

/// Errors raised while building a statement. They all describe invalid input and
/// are raised immediately, never downgraded into a weaker query.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SqlError {
	#[error("relation '{relation}' has no field '{field}'")]
	UnknownField {
		relation: String,
		field: String,
	},

	#[error("unknown relation '{name}'")]
	UnknownRelation {
		name: String,
	},

	#[error("unsupported operator '{operator}'")]
	UnsupportedOperator {
		operator: String,
	},

	#[error("unsupported pipeline stage '{stage}'")]
	UnsupportedStage {
		stage: String,
	},

	#[error("pipeline stage '{stage}' is not implemented")]
	UnimplementedStage {
		stage: String,
	},

	#[error("$lookup with a sub-pipeline is not supported")]
	PipelineLookup,

	#[error("upsert accepts exactly one row, got {rows}")]
	MultiRowUpsert {
		rows: usize,
	},

	#[error("refusing to delete from '{relation}' without a selector")]
	UnfilteredDelete {
		relation: String,
	},

	#[error("invalid selector: {message}")]
	InvalidSelector {
		message: String,
	},

	#[error("invalid modifier: {message}")]
	InvalidModifier {
		message: String,
	},

	#[error("invalid projection: {message}")]
	InvalidProjection {
		message: String,
	},

	#[error("invalid sort: {message}")]
	InvalidSort {
		message: String,
	},

	#[error("invalid expression: {message}")]
	InvalidExpression {
		message: String,
	},

	#[error("invalid pipeline: {message}")]
	InvalidPipeline {
		message: String,
	},

	#[error("invalid index: {message}")]
	InvalidIndex {
		message: String,
	},

	#[error("invalid insert: {message}")]
	InvalidInsert {
		message: String,
	},
}

impl SqlError {
	pub fn unknown_field(relation: impl Into<String>, field: impl Into<String>) -> Self {
		SqlError::UnknownField {
			relation: relation.into(),
			field: field.into(),
		}
	}

	pub fn unsupported_operator(operator: impl Into<String>) -> Self {
		SqlError::UnsupportedOperator {
			operator: operator.into(),
		}
	}

	pub fn invalid_selector(message: impl Into<String>) -> Self {
		SqlError::InvalidSelector {
			message: message.into(),
		}
	}

	pub fn invalid_modifier(message: impl Into<String>) -> Self {
		SqlError::InvalidModifier {
			message: message.into(),
		}
	}

	pub fn invalid_projection(message: impl Into<String>) -> Self {
		SqlError::InvalidProjection {
			message: message.into(),
		}
	}

	pub fn invalid_expression(message: impl Into<String>) -> Self {
		SqlError::InvalidExpression {
			message: message.into(),
		}
	}

	pub fn invalid_pipeline(message: impl Into<String>) -> Self {
		SqlError::InvalidPipeline {
			message: message.into(),
		}
	}
}
