// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use mongo2pg_type::{DataType, Document, Relation, Value, is_operator_key};
use uuid::Uuid;

use crate::{
	Atom, Qualifier, RelationRef, Result, Scope, Source, SqlError, Statement, assignments,
	atom::join_atoms,
	field::null_coalesced,
	flatten_modifier,
	ident::quote_ident,
};

/// What happens when an inserted row collides with an existing one.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Conflict {
	/// Let the database raise.
	#[default]
	Raise,
	/// `ON CONFLICT DO NOTHING`.
	Ignore,
	/// `ON CONFLICT (...) DO UPDATE`; accepts exactly one row.
	Upsert(UpsertTarget),
}

/// Conflict target and update of an upsert.
///
/// Without a selector the conflict target is the identity column. Without a
/// modifier every inserted column is overwritten with the proposed value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpsertTarget {
	pub selector: Option<Document>,
	pub modifier: Option<Document>,
}

#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
	pub conflict: Conflict,
	/// Columns to return; ignored for upserts, which always return the identity
	/// and the `inserted` marker.
	pub returning: Vec<String>,
}

impl InsertOptions {
	pub fn ignore_conflicts() -> Self {
		Self {
			conflict: Conflict::Ignore,
			returning: vec![],
		}
	}

	pub fn upsert(target: UpsertTarget) -> Self {
		Self {
			conflict: Conflict::Upsert(target),
			returning: vec![],
		}
	}

	pub fn returning(mut self, columns: &[&str]) -> Self {
		self.returning = columns.iter().map(|c| c.to_string()).collect();
		self
	}
}

/// A built insert plus the identity of every row, generated ones included.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
	pub statement: Statement,
	pub identities: Vec<Value>,
}

/// Whether an upsert inserted a new row or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
	Inserted,
	Updated,
}

/// Upsert outcome in matched / upserted terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertCounts {
	pub matched: u64,
	pub upserted: u64,
}

impl UpsertOutcome {
	/// Reads the `inserted` column an upsert returns; `xmax = 0` marks a row
	/// created by the current transaction.
	pub fn from_row(row: &Document) -> Option<Self> {
		match row.get("inserted")? {
			Value::Bool(true) => Some(UpsertOutcome::Inserted),
			Value::Bool(false) => Some(UpsertOutcome::Updated),
			_ => None,
		}
	}
}

impl From<UpsertOutcome> for UpsertCounts {
	fn from(outcome: UpsertOutcome) -> Self {
		match outcome {
			UpsertOutcome::Inserted => UpsertCounts {
				matched: 0,
				upserted: 1,
			},
			UpsertOutcome::Updated => UpsertCounts {
				matched: 1,
				upserted: 0,
			},
		}
	}
}

/// A fresh identity: a time-ordered UUID, hex encoded unless the column is a uuid.
fn generate_identity(data_type: &DataType) -> Value {
	let id = Uuid::now_v7();
	match data_type.concrete() {
		DataType::Uuid => Value::String(id.hyphenated().to_string()),
		_ => Value::String(id.simple().to_string()),
	}
}

/// `INSERT INTO "relation" (...) VALUES (...), (...)`.
///
/// The column list is the union of the fields present in any row, in relation
/// order. Rows lacking a column get `NULL`; rows lacking an identity get a
/// generated one.
pub fn insert(relation: &Relation, rows: &[Document], options: &InsertOptions) -> Result<Insert> {
	if rows.is_empty() {
		return Err(SqlError::InvalidInsert {
			message: "no rows to insert".to_string(),
		});
	}
	if let Conflict::Upsert(_) = options.conflict {
		if rows.len() != 1 {
			return Err(SqlError::MultiRowUpsert {
				rows: rows.len(),
			});
		}
	}

	let identity = relation.identity();
	let mut prepared = Vec::with_capacity(rows.len());
	let mut identities = Vec::with_capacity(rows.len());
	for row in rows {
		for key in row.keys() {
			if is_operator_key(key) {
				return Err(SqlError::InvalidInsert {
					message: format!("operator '{key}' in an inserted document"),
				});
			}
			if !relation.has_field(key) {
				return Err(SqlError::unknown_field(relation.name(), key));
			}
		}
		let mut row = row.clone();
		if row.get(identity).is_none_or(Value::is_null) {
			let data_type = relation.field(identity).cloned().unwrap_or(DataType::Text);
			row.insert(identity.to_string(), generate_identity(&data_type));
		}
		identities.push(row.get(identity).cloned().unwrap_or(Value::Null));
		prepared.push(row);
	}

	let columns: Vec<(&String, &DataType)> =
		relation.fields().iter().filter(|(name, _)| prepared.iter().any(|row| row.contains_key(*name))).collect();

	let mut statement = Statement::new(Source::Table(relation.name().to_string()));
	statement.text("INSERT INTO ");
	statement.push(Atom::Relation(RelationRef::From));
	statement.text(format!(
		" ({}) VALUES ",
		columns.iter().map(|(name, _)| quote_ident(name)).collect::<Vec<_>>().join(", ")
	));

	let tuples = prepared.iter().map(|row| {
		let values = columns.iter().map(|(name, data_type)| match row.get(*name) {
			None | Some(Value::Null) => vec![Atom::text("NULL")],
			Some(value) => {
				let mut atoms = vec![Atom::arg(value.clone())];
				if data_type.is_json() {
					atoms.push(Atom::text("::jsonb"));
				}
				atoms
			}
		});
		let mut tuple = vec![Atom::text("(")];
		tuple.extend(join_atoms(values, ", "));
		tuple.push(Atom::text(")"));
		tuple
	});
	statement.extend(join_atoms(tuples, ", "));

	match &options.conflict {
		Conflict::Raise => returning(&mut statement, &options.returning),
		Conflict::Ignore => {
			statement.text(" ON CONFLICT DO NOTHING");
			returning(&mut statement, &options.returning);
		}
		Conflict::Upsert(target) => {
			statement.text(format!(" ON CONFLICT ({}) DO UPDATE SET ", conflict_target(relation, target)?));
			match &target.modifier {
				Some(modifier) => {
					// EXCLUDED is in scope too, so reads of the existing row name the table
					let flat = flatten_modifier(modifier)?;
					let qualifier = Qualifier::Table(relation.name().to_string());
					statement.extend(assignments(&flat, &Scope::qualified(relation, &qualifier))?);
				}
				None => {
					let mut overwritten: Vec<&str> =
						columns.iter().map(|(name, _)| name.as_str()).filter(|name| *name != identity).collect();
					if overwritten.is_empty() {
						overwritten.push(identity);
					}
					statement.text(
						overwritten
							.iter()
							.map(|name| format!("{0} = EXCLUDED.{0}", quote_ident(name)))
							.collect::<Vec<_>>()
							.join(", "),
					);
				}
			}
			statement.text(format!(" RETURNING {}, (xmax = 0) AS \"inserted\"", quote_ident(identity)));
		}
	}

	Ok(Insert {
		statement,
		identities,
	})
}

/// The identity column, or the selector's columns wrapped the way the backing
/// unique index wraps them.
fn conflict_target(relation: &Relation, target: &UpsertTarget) -> Result<String> {
	let identity = relation.identity();
	let fields: Vec<&String> = match &target.selector {
		Some(selector) => selector.keys().filter(|k| !is_operator_key(k)).collect(),
		None => vec![],
	};

	if fields.is_empty() || (fields.len() == 1 && fields[0] == identity) {
		return Ok(quote_ident(identity));
	}

	let mut expressions = Vec::with_capacity(fields.len());
	for field in fields {
		let Some(data_type) = relation.field(field) else {
			return Err(SqlError::unknown_field(relation.name(), field.as_str()));
		};
		expressions.push(null_coalesced(field, data_type));
	}
	Ok(expressions.join(", "))
}

pub(crate) fn returning(statement: &mut Statement, columns: &[String]) {
	if columns.is_empty() {
		return;
	}
	statement.text(format!(
		" RETURNING {}",
		columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
	));
}
