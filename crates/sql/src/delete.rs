// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use mongo2pg_type::{Document, Relation};

use crate::{
	Atom, RelationRef, Result, Scope, Source, SqlError, Statement, compile_selector, ident::quote_ident,
	insert::returning, update::limited,
};

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
	/// Delete at most this many rows.
	pub limit: Option<u64>,
	/// Allows a selector that matches every row.
	pub allow_unfiltered: bool,
	pub returning: Vec<String>,
}

impl DeleteOptions {
	pub fn one() -> Self {
		Self {
			limit: Some(1),
			..Default::default()
		}
	}

	pub fn allow_unfiltered(mut self) -> Self {
		self.allow_unfiltered = true;
		self
	}
}

/// `DELETE FROM "relation" [WHERE ...]`.
///
/// A selector that compiles to no condition is refused unless the options allow
/// it. A row limit deletes through `WHERE "_id" IN (SELECT "_id" ... LIMIT n)`.
pub fn delete(relation: &Relation, selector: &Document, options: &DeleteOptions) -> Result<Statement> {
	let filter = compile_selector(selector, &Scope::new(relation))?;
	if filter.is_empty() && !options.allow_unfiltered {
		return Err(SqlError::UnfilteredDelete {
			relation: relation.name().to_string(),
		});
	}

	let mut statement = Statement::new(Source::Table(relation.name().to_string()));
	statement.text("DELETE FROM ");
	statement.push(Atom::Relation(RelationRef::From));

	match options.limit {
		Some(limit) => {
			statement.text(format!(" WHERE {} IN ", quote_ident(relation.identity())));
			statement.push(Atom::statement(limited(relation, filter, limit, false)));
		}
		None => {
			if !filter.is_empty() {
				statement.text(" WHERE ");
				statement.extend(filter);
			}
		}
	}

	returning(&mut statement, &options.returning);
	Ok(statement)
}
