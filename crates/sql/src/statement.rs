// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::fmt::Write;

use serde_json::Value;

use crate::{Atom, RelationRef, ident::quote_ident};

/// Compiler output: SQL text with `$1..$n` placeholders and the matching arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
	pub sql: String,
	pub args: Vec<Value>,
}

/// What a statement reads from.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Source {
	#[default]
	None,
	Table(String),
	/// A derived select; compiled as `(...) AS <label>`.
	Derived(Box<Statement>),
}

/// An ordered list of atoms plus the source they read from.
///
/// A statement is built once and may be compiled any number of times at any
/// argument offset, so the same statement can be embedded in an outer one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
	atoms: Vec<Atom>,
	source: Source,
	named: bool,
	correlated: bool,
	synthetic: Vec<String>,
}

struct Emitted {
	compiled: Compiled,
	next_label: u32,
}

impl Statement {
	pub fn new(source: Source) -> Self {
		Self {
			source,
			..Default::default()
		}
	}

	pub fn push(&mut self, atom: Atom) {
		self.atoms.push(atom);
	}

	pub fn text(&mut self, text: impl Into<String>) {
		self.atoms.push(Atom::Text(text.into()));
	}

	pub fn arg(&mut self, value: Value) {
		self.atoms.push(Atom::Arg(value));
	}

	pub fn extend(&mut self, atoms: impl IntoIterator<Item = Atom>) {
		self.atoms.extend(atoms);
	}

	/// Marks the statement as one the outer statement references by label.
	pub fn named(mut self) -> Self {
		self.named = true;
		self
	}

	pub fn is_named(&self) -> bool {
		self.named
	}

	pub fn set_correlated(&mut self, correlated: bool) {
		self.correlated = correlated;
	}

	/// Whether the statement carries a correlated (lateral) join.
	pub fn is_correlated(&self) -> bool {
		self.correlated
	}

	pub fn register_synthetic(&mut self, name: impl Into<String>) {
		let name = name.into();
		if !self.synthetic.contains(&name) {
			self.synthetic.push(name);
		}
	}

	/// Output fields computed by an expression rather than read from a column.
	pub fn synthetic(&self) -> &[String] {
		&self.synthetic
	}

	pub fn atoms(&self) -> &[Atom] {
		&self.atoms
	}

	pub fn source(&self) -> &Source {
		&self.source
	}

	pub fn arg_count(&self) -> usize {
		let derived = match &self.source {
			Source::Derived(statement) => statement.arg_count(),
			_ => 0,
		};
		derived + self.atoms.iter().map(Atom::arg_count).sum::<usize>()
	}

	pub fn compile(&self) -> Compiled {
		self.compile_at(0, 0)
	}

	/// Compiles with the first placeholder numbered `arg_offset + 1` and the first
	/// subquery label being the `label`-th one (`0` is `a`).
	pub fn compile_at(&self, arg_offset: usize, label: u32) -> Compiled {
		self.emit(arg_offset, label, None).compiled
	}

	fn emit(&self, arg_offset: usize, label: u32, outer: Option<&str>) -> Emitted {
		let mut sql = String::new();
		let mut args: Vec<Value> = Vec::new();
		let mut next_label = label;

		let source_name = match &self.source {
			Source::None => String::new(),
			Source::Table(name) => quote_ident(name),
			Source::Derived(_) => {
				let name = label_name(next_label);
				next_label += 1;
				name
			}
		};

		for atom in &self.atoms {
			match atom {
				Atom::Text(text) => sql.push_str(text),
				Atom::Arg(value) => {
					args.push(value.clone());
					let _ = write!(sql, "${}", arg_offset + args.len());
				}
				Atom::Statement(nested) => {
					let emitted = nested.emit(arg_offset + args.len(), next_label, Some(&source_name));
					next_label = emitted.next_label;
					sql.push('(');
					sql.push_str(&emitted.compiled.sql);
					sql.push(')');
					args.extend(emitted.compiled.args);
					if nested.named {
						let _ = write!(sql, " AS {}", label_name(next_label));
						next_label += 1;
					}
				}
				Atom::Relation(RelationRef::Table(name)) => sql.push_str(&quote_ident(name)),
				Atom::Relation(RelationRef::Source) => sql.push_str(&source_name),
				Atom::Relation(RelationRef::Outer) => sql.push_str(outer.unwrap_or_default()),
				Atom::Relation(RelationRef::From) => match &self.source {
					Source::None => {}
					Source::Table(_) => sql.push_str(&source_name),
					Source::Derived(derived) => {
						let emitted = derived.emit(arg_offset + args.len(), next_label, None);
						next_label = emitted.next_label;
						let _ = write!(sql, "({}) AS {source_name}", emitted.compiled.sql);
						args.extend(emitted.compiled.args);
					}
				},
			}
		}

		Emitted {
			compiled: Compiled {
				sql,
				args,
			},
			next_label,
		}
	}
}

/// `0` is `a`, `25` is `z`; past that the letter repeats with a numeric suffix.
fn label_name(label: u32) -> String {
	let letter = (b'a' + (label % 26) as u8) as char;
	if label < 26 {
		letter.to_string()
	} else {
		format!("{letter}{}", label / 26)
	}
}
