// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use indexmap::IndexMap;
use mongo2pg_type::{Document, is_operator_key};
use serde_json::Value;

use crate::{
	Atom, FieldRef, Result, Scope, SqlError,
	atom::join_atoms,
	expression::{compile_expression, is_expression},
	ident::{quote_ident, quote_literal},
};

/// What a modifier does to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
	Set(Value),
	Unset,
	Inc(Value),
}

/// Flattens `{$set: {..}, $unset: {..}, $inc: {..}}` into one field to
/// assignment map, in first-seen order.
pub fn flatten_modifier(modifier: &Document) -> Result<IndexMap<String, Assignment>> {
	let mut flat: IndexMap<String, Assignment> = IndexMap::new();

	for (operator, fields) in modifier {
		if !is_operator_key(operator) {
			return Err(SqlError::invalid_modifier(format!(
				"replacement documents are not supported, found field '{operator}'"
			)));
		}
		let Value::Object(fields) = fields else {
			return Err(SqlError::invalid_modifier(format!("{operator} requires a document")));
		};

		for (field, value) in fields {
			let assignment = match operator.as_str() {
				"$set" => Assignment::Set(value.clone()),
				"$unset" => Assignment::Unset,
				"$inc" => {
					if !value.is_number() {
						return Err(SqlError::invalid_modifier(format!(
							"$inc on '{field}' requires a number"
						)));
					}
					Assignment::Inc(value.clone())
				}
				_ => return Err(SqlError::unsupported_operator(operator)),
			};

			if let Some(existing) = flat.keys().find(|existing| overlaps(existing, field)) {
				return Err(SqlError::invalid_modifier(format!(
					"'{field}' conflicts with '{existing}' in the same modifier"
				)));
			}
			flat.insert(field.clone(), assignment);
		}
	}

	Ok(flat)
}

/// Same field, or one is a dotted prefix of the other.
fn overlaps(a: &str, b: &str) -> bool {
	let (short, long) = if a.len() <= b.len() {
		(a, b)
	} else {
		(b, a)
	};
	long == short || (long.starts_with(short) && long.as_bytes()[short.len()] == b'.')
}

/// The current value of `column` on the right of an assignment. The target
/// side of a SET list is never qualified.
fn read(scope: &Scope, column: &str) -> Vec<Atom> {
	let mut atoms = scope.qualifier.atoms();
	atoms.push(Atom::column(column));
	atoms
}

/// Compiles flattened assignments into a SET list: `"a" = $1, "b" = NULL`.
///
/// Assignments into JSON columns are folded per column into one nested
/// `jsonb_set` / `#-` expression.
pub fn assignments(flat: &IndexMap<String, Assignment>, scope: &Scope) -> Result<Vec<Atom>> {
	let mut columns: IndexMap<String, Vec<Atom>> = IndexMap::new();

	for (field, assignment) in flat {
		match scope.resolve(field)? {
			FieldRef::Column {
				name,
				data_type,
			} => {
				if name == scope.relation.identity() {
					return Err(SqlError::invalid_modifier(format!("the identity field '{name}' is immutable")));
				}
				let value = match assignment {
					Assignment::Set(value) if is_expression(value) => compile_expression(value, scope)?,
					Assignment::Set(Value::Null) | Assignment::Unset => vec![Atom::text("NULL")],
					Assignment::Set(value) => {
						let mut atoms = vec![Atom::arg(value.clone())];
						if data_type.is_json() {
							atoms.push(Atom::text("::jsonb"));
						}
						atoms
					}
					Assignment::Inc(amount) => {
						let mut atoms = vec![Atom::text("COALESCE(")];
						atoms.extend(read(scope, &name));
						atoms.push(Atom::text(", 0) + "));
						atoms.push(Atom::arg(amount.clone()));
						atoms
					}
				};
				columns.insert(name, value);
			}
			FieldRef::Json {
				column,
				path,
			} => {
				let previous = match columns.shift_remove(&column) {
					Some(previous) => previous,
					None => {
						let mut atoms = vec![Atom::text("COALESCE(")];
						atoms.extend(read(scope, &column));
						atoms.push(Atom::text(", '{}'::jsonb)"));
						atoms
					}
				};
				let folded = fold_json(&column, &path, assignment, previous, scope)?;
				columns.insert(column, folded);
			}
		}
	}

	if columns.is_empty() {
		return Err(SqlError::invalid_modifier("the modifier assigns no fields"));
	}

	let list = columns.into_iter().map(|(column, value)| {
		let mut atoms = vec![Atom::text(format!("{} = ", quote_ident(&column)))];
		atoms.extend(value);
		atoms
	});
	Ok(join_atoms(list, ", "))
}

fn fold_json(
	column: &str,
	path: &[String],
	assignment: &Assignment,
	previous: Vec<Atom>,
	scope: &Scope,
) -> Result<Vec<Atom>> {
	let path_literal = quote_literal(&format!(
		"{{{}}}",
		path.iter().map(|s| format!("\"{}\"", s.replace('"', "\\\""))).collect::<Vec<_>>().join(",")
	));

	let mut atoms = Vec::new();
	match assignment {
		Assignment::Unset => {
			atoms.push(Atom::text("("));
			atoms.extend(previous);
			atoms.push(Atom::text(format!(" #- {path_literal})")));
		}
		Assignment::Set(value) => {
			atoms.push(Atom::text("jsonb_set("));
			atoms.extend(previous);
			atoms.push(Atom::text(format!(", {path_literal}, ")));
			if is_expression(value) {
				atoms.push(Atom::text("to_jsonb("));
				atoms.extend(compile_expression(value, scope)?);
				atoms.push(Atom::text(")"));
			} else {
				atoms.push(Atom::arg(value.clone()));
				atoms.push(Atom::text("::jsonb"));
			}
			atoms.push(Atom::text(", true)"));
		}
		Assignment::Inc(amount) => {
			atoms.push(Atom::text("jsonb_set("));
			atoms.extend(previous);
			atoms.push(Atom::text(format!(", {path_literal}, to_jsonb(COALESCE((")));
			atoms.extend(read(scope, column));
			atoms.push(Atom::text(format!(" #>> {path_literal})::numeric, 0) + ")));
			atoms.push(Atom::arg(amount.clone()));
			atoms.push(Atom::text("), true)"));
		}
	}
	Ok(atoms)
}
