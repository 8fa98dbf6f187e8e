// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use mongo2pg_type::{Document, Value};

use crate::{Lookup, Result, SqlError};

/// A parsed pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
	Match(Document),
	Sort(Document),
	Limit(u64),
	Skip(u64),
	Project(Document),
	Group(Document),
	/// `$count`: the output field name.
	Count(String),
	Lookup(Lookup),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
	Lookup,
	Match,
	Sort,
	Skip,
	Limit,
	Project,
	Group,
	Count,
}

impl StageKind {
	/// Position of the clause in a single select: a stage may only fold into a
	/// unit whose occupied clauses all apply no later than it does.
	pub fn rank(&self) -> u8 {
		match self {
			StageKind::Lookup => 0,
			StageKind::Match => 1,
			StageKind::Sort => 2,
			StageKind::Skip => 3,
			StageKind::Limit => 4,
			StageKind::Project => 5,
			StageKind::Group | StageKind::Count => 6,
		}
	}
}

impl Stage {
	pub fn kind(&self) -> StageKind {
		match self {
			Stage::Match(_) => StageKind::Match,
			Stage::Sort(_) => StageKind::Sort,
			Stage::Limit(_) => StageKind::Limit,
			Stage::Skip(_) => StageKind::Skip,
			Stage::Project(_) => StageKind::Project,
			Stage::Group(_) => StageKind::Group,
			Stage::Count(_) => StageKind::Count,
			Stage::Lookup(_) => StageKind::Lookup,
		}
	}

	pub fn parse(stage: &Value) -> Result<Self> {
		let Value::Object(stage) = stage else {
			return Err(SqlError::invalid_pipeline("a stage must be a document"));
		};
		let mut entries = stage.iter();
		let (Some((name, body)), None) = (entries.next(), entries.next()) else {
			return Err(SqlError::invalid_pipeline("a stage holds exactly one operator"));
		};

		match name.as_str() {
			"$match" => Ok(Stage::Match(document(name, body)?)),
			"$sort" => {
				let order = document(name, body)?;
				if order.is_empty() {
					return Err(SqlError::invalid_pipeline("$sort requires at least one field"));
				}
				Ok(Stage::Sort(order))
			}
			"$limit" => match body.as_u64() {
				Some(limit) if limit > 0 => Ok(Stage::Limit(limit)),
				_ => Err(SqlError::invalid_pipeline("$limit requires a positive integer")),
			},
			"$skip" => match body.as_u64() {
				Some(skip) => Ok(Stage::Skip(skip)),
				None => Err(SqlError::invalid_pipeline("$skip requires a non-negative integer")),
			},
			"$project" => Ok(Stage::Project(document(name, body)?)),
			"$group" => Ok(Stage::Group(document(name, body)?)),
			"$count" => match body.as_str() {
				Some(field) if !field.is_empty() && !field.starts_with('$') && !field.contains('.') => {
					Ok(Stage::Count(field.to_string()))
				}
				_ => Err(SqlError::invalid_pipeline("$count requires a plain field name")),
			},
			"$lookup" => Ok(Stage::Lookup(Lookup::parse(body)?)),
			"$unwind" => Err(SqlError::UnimplementedStage {
				stage: name.clone(),
			}),
			_ => Err(SqlError::UnsupportedStage {
				stage: name.clone(),
			}),
		}
	}
}

fn document(name: &str, body: &Value) -> Result<Document> {
	match body {
		Value::Object(document) => Ok(document.clone()),
		_ => Err(SqlError::invalid_pipeline(format!("{name} requires a document"))),
	}
}
