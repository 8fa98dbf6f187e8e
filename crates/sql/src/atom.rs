// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use serde_json::Value;

use crate::{Statement, ident::quote_ident};

/// One token of a statement under construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
	/// Literal SQL text, copied verbatim.
	Text(String),
	/// A bound argument; becomes the next `$n` placeholder.
	Arg(Value),
	/// A nested statement, spliced in parentheses.
	Statement(Box<Statement>),
	/// A reference to a relation, resolved when the statement is compiled.
	Relation(RelationRef),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationRef {
	/// A named table, emitted quoted.
	Table(String),
	/// The FROM item of the enclosing statement: its table, or its derived
	/// select in parentheses followed by the select's label.
	From,
	/// The name the enclosing statement's source is reachable by.
	Source,
	/// The source name of the statement one nesting level up. Used by
	/// correlated subqueries such as lateral lookups.
	Outer,
}

impl Atom {
	pub fn text(text: impl Into<String>) -> Self {
		Atom::Text(text.into())
	}

	pub fn arg(value: Value) -> Self {
		Atom::Arg(value)
	}

	pub fn column(name: &str) -> Self {
		Atom::Text(quote_ident(name))
	}

	pub fn statement(statement: Statement) -> Self {
		Atom::Statement(Box::new(statement))
	}

	/// Number of bound arguments this atom contributes, nested statements included.
	pub fn arg_count(&self) -> usize {
		match self {
			Atom::Arg(_) => 1,
			Atom::Statement(statement) => statement.arg_count(),
			Atom::Text(_) | Atom::Relation(_) => 0,
		}
	}
}

/// Joins atom groups with a separator, skipping empty groups.
pub(crate) fn join_atoms(groups: impl IntoIterator<Item = Vec<Atom>>, separator: &str) -> Vec<Atom> {
	let mut result = Vec::new();
	for group in groups {
		if group.is_empty() {
			continue;
		}
		if !result.is_empty() {
			result.push(Atom::text(separator));
		}
		result.extend(group);
	}
	result
}

/// Wraps atoms in parentheses.
pub(crate) fn parenthesize(atoms: Vec<Atom>) -> Vec<Atom> {
	let mut result = Vec::with_capacity(atoms.len() + 2);
	result.push(Atom::text("("));
	result.extend(atoms);
	result.push(Atom::text(")"));
	result
}
