// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use mongo2pg_type::{Document, Relation, Value};

use crate::{
	Atom, RelationRef, Result, Scope, Source, Statement, assignments, compile_selector, flatten_modifier,
	ident::quote_ident, insert::returning,
};

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
	/// Update at most this many rows.
	pub limit: Option<u64>,
	pub returning: Vec<String>,
}

impl UpdateOptions {
	pub fn one() -> Self {
		Self {
			limit: Some(1),
			returning: vec![],
		}
	}

	pub fn returning(mut self, columns: &[&str]) -> Self {
		self.returning = columns.iter().map(|c| c.to_string()).collect();
		self
	}
}

/// `UPDATE "relation" SET ... [WHERE ...]`.
///
/// A row limit selects the identities to update in a locking subselect:
/// `WHERE "_id" IN (SELECT "_id" FROM ... LIMIT n FOR UPDATE)`.
pub fn update(
	relation: &Relation,
	selector: &Document,
	modifier: &Document,
	options: &UpdateOptions,
) -> Result<Statement> {
	let scope = Scope::new(relation);
	let set = assignments(&flatten_modifier(modifier)?, &scope)?;
	let filter = compile_selector(selector, &scope)?;

	let mut statement = Statement::new(Source::Table(relation.name().to_string()));
	statement.text("UPDATE ");
	statement.push(Atom::Relation(RelationRef::From));
	statement.text(" SET ");
	statement.extend(set);

	match options.limit {
		Some(limit) => {
			statement.text(format!(" WHERE {} IN ", quote_ident(relation.identity())));
			statement.push(Atom::statement(limited(relation, filter, limit, true)));
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

/// `SELECT "_id" FROM "relation" [WHERE ...] LIMIT n [FOR UPDATE]`.
pub(crate) fn limited(relation: &Relation, filter: Vec<Atom>, limit: u64, lock: bool) -> Statement {
	let mut statement = Statement::new(Source::Table(relation.name().to_string()));
	statement.text(format!("SELECT {} FROM ", quote_ident(relation.identity())));
	statement.push(Atom::Relation(RelationRef::From));
	if !filter.is_empty() {
		statement.text(" WHERE ");
		statement.extend(filter);
	}
	statement.text(" LIMIT ");
	statement.arg(Value::from(limit));
	if lock {
		statement.text(" FOR UPDATE");
	}
	statement
}
