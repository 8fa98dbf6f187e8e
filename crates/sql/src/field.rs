// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use mongo2pg_type::{DataType, Relation, ValueKind};

use crate::{
	Atom, RelationRef, Result, SqlError,
	ident::{quote_ident, quote_literal},
};

/// How column references are prefixed.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Qualifier {
	#[default]
	None,
	/// The enclosing statement's source name, resolved at compile time.
	Source,
	/// A table name, quoted.
	Table(String),
	/// A generated alias such as `j1`, emitted as is.
	Alias(String),
}

impl Qualifier {
	pub(crate) fn atoms(&self) -> Vec<Atom> {
		match self {
			Qualifier::None => vec![],
			Qualifier::Source => vec![Atom::Relation(RelationRef::Source), Atom::text(".")],
			Qualifier::Table(name) => vec![Atom::text(format!("{}.", quote_ident(name)))],
			Qualifier::Alias(alias) => vec![Atom::text(format!("{alias}."))],
		}
	}
}

/// A relation plus the qualifier its columns are referenced with.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
	pub relation: &'a Relation,
	pub qualifier: &'a Qualifier,
}

static UNQUALIFIED: Qualifier = Qualifier::None;

impl<'a> Scope<'a> {
	pub fn new(relation: &'a Relation) -> Self {
		Self {
			relation,
			qualifier: &UNQUALIFIED,
		}
	}

	pub fn qualified(relation: &'a Relation, qualifier: &'a Qualifier) -> Self {
		Self {
			relation,
			qualifier,
		}
	}

	pub fn resolve(&self, name: &str) -> Result<FieldRef> {
		resolve_field(self.relation, name)
	}

	/// The qualified column reference, without checking the relation.
	pub fn column(&self, name: &str) -> Vec<Atom> {
		let mut atoms = self.qualifier.atoms();
		atoms.push(Atom::column(name));
		atoms
	}

	/// Resolves `name` and renders it, casting JSON descent for a value of `kind`.
	pub fn field(&self, name: &str, kind: Option<ValueKind>) -> Result<Vec<Atom>> {
		Ok(self.resolve(name)?.atoms(self.qualifier, kind))
	}
}

/// A resolved field: either a column or a path into a JSON column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRef {
	Column {
		name: String,
		data_type: DataType,
	},
	Json {
		column: String,
		path: Vec<String>,
	},
}

/// Resolves a possibly dotted field name against a relation.
///
/// An exact column match wins. Otherwise the part before the first dot must name
/// a JSON column and the rest becomes a descent path into it.
pub fn resolve_field(relation: &Relation, name: &str) -> Result<FieldRef> {
	if let Some(data_type) = relation.field(name) {
		return Ok(FieldRef::Column {
			name: name.to_string(),
			data_type: data_type.clone(),
		});
	}

	if let Some((root, rest)) = name.split_once('.') {
		if let Some(data_type) = relation.field(root) {
			if data_type.is_json() && !rest.is_empty() && rest.split('.').all(|s| !s.is_empty()) {
				return Ok(FieldRef::Json {
					column: root.to_string(),
					path: rest.split('.').map(str::to_string).collect(),
				});
			}
		}
	}

	Err(SqlError::unknown_field(relation.name(), name))
}

impl FieldRef {
	pub fn column(&self) -> &str {
		match self {
			FieldRef::Column {
				name,
				..
			} => name,
			FieldRef::Json {
				column,
				..
			} => column,
		}
	}

	pub fn is_json(&self) -> bool {
		match self {
			FieldRef::Column {
				data_type,
				..
			} => data_type.is_json(),
			FieldRef::Json {
				..
			} => true,
		}
	}

	pub fn is_array(&self) -> bool {
		match self {
			FieldRef::Column {
				data_type,
				..
			} => data_type.element().is_some(),
			FieldRef::Json {
				..
			} => false,
		}
	}

	/// The type the rendered reference has when compared against a value of `kind`.
	pub fn data_type(&self, kind: Option<ValueKind>) -> DataType {
		match self {
			FieldRef::Column {
				data_type,
				..
			} => data_type.concrete().clone(),
			FieldRef::Json {
				..
			} => kind.map(|k| k.data_type()).unwrap_or(DataType::Jsonb),
		}
	}

	/// Renders the reference. JSON descent is cast for a comparison against a
	/// value of `kind`: numbers and booleans extract text and cast, strings
	/// extract text, anything else stays `jsonb`.
	pub fn atoms(&self, qualifier: &Qualifier, kind: Option<ValueKind>) -> Vec<Atom> {
		let mut atoms = Vec::new();
		match self {
			FieldRef::Column {
				name,
				..
			} => {
				atoms.extend(qualifier.atoms());
				atoms.push(Atom::column(name));
			}
			FieldRef::Json {
				column,
				path,
			} => {
				let text = matches!(kind, Some(ValueKind::String | ValueKind::Number | ValueKind::Boolean));
				atoms.push(Atom::text("("));
				atoms.extend(qualifier.atoms());
				let mut descent = quote_ident(column);
				for (i, segment) in path.iter().enumerate() {
					let last = i + 1 == path.len();
					descent.push_str(if last && text {
						"->>"
					} else {
						"->"
					});
					descent.push_str(&path_segment(segment));
				}
				descent.push(')');
				match kind {
					Some(ValueKind::Number) => descent.push_str("::numeric"),
					Some(ValueKind::Boolean) => descent.push_str("::boolean"),
					Some(ValueKind::Null | ValueKind::Array | ValueKind::Object) => {
						descent.push_str("::jsonb")
					}
					Some(ValueKind::String) | None => {}
				}
				atoms.push(Atom::text(descent));
			}
		}
		atoms
	}
}

/// Array positions descend by index, everything else by key.
fn path_segment(segment: &str) -> String {
	if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
		segment.to_string()
	} else {
		quote_literal(segment)
	}
}

/// `COALESCE("f", <sentinel>)`, the form unique indexes and upsert conflict
/// targets share so that missing values collide.
pub(crate) fn null_coalesced(name: &str, data_type: &DataType) -> String {
	format!("COALESCE({}, {})", quote_ident(name), data_type.null_sentinel())
}

#[cfg(test)]
mod tests {
	use mongo2pg_type::Relation;

	use super::*;
	use crate::{Source, Statement};

	fn posts() -> Relation {
		Relation::builder("posts")
			.field("title", DataType::Text)
			.field("meta", DataType::Jsonb)
			.field("tags", DataType::array(DataType::Text))
			.build()
			.unwrap()
	}

	fn render(atoms: Vec<Atom>) -> String {
		let mut statement = Statement::new(Source::Table("posts".to_string()));
		statement.extend(atoms);
		statement.compile().sql
	}

	#[test]
	fn test_resolve_column() {
		let relation = posts();
		let field = resolve_field(&relation, "title").unwrap();
		assert_eq!(render(field.atoms(&Qualifier::None, None)), r#""title""#);
		assert!(!field.is_json());
	}

	#[test]
	fn test_resolve_json_path_casts() {
		let relation = posts();
		let field = resolve_field(&relation, "meta.author.age").unwrap();
		assert_eq!(
			render(field.atoms(&Qualifier::None, Some(ValueKind::Number))),
			r#"("meta"->'author'->>'age')::numeric"#
		);
		assert_eq!(
			render(field.atoms(&Qualifier::None, Some(ValueKind::String))),
			r#"("meta"->'author'->>'age')"#
		);
		assert_eq!(
			render(field.atoms(&Qualifier::None, Some(ValueKind::Object))),
			r#"("meta"->'author'->'age')::jsonb"#
		);
	}

	#[test]
	fn test_resolve_json_array_index() {
		let relation = posts();
		let field = resolve_field(&relation, "meta.links.0").unwrap();
		assert_eq!(render(field.atoms(&Qualifier::None, None)), r#"("meta"->'links'->0)"#);
	}

	#[test]
	fn test_qualifiers() {
		let relation = posts();
		let field = resolve_field(&relation, "title").unwrap();
		assert_eq!(render(field.atoms(&Qualifier::Source, None)), r#""posts"."title""#);
		assert_eq!(render(field.atoms(&Qualifier::Alias("j1".to_string()), None)), r#"j1."title""#);
	}

	#[test]
	fn test_unknown_field() {
		let relation = posts();
		assert_eq!(resolve_field(&relation, "missing"), Err(SqlError::unknown_field("posts", "missing")));
		// descent is only allowed into JSON columns
		assert_eq!(resolve_field(&relation, "title.x"), Err(SqlError::unknown_field("posts", "title.x")));
	}

	#[test]
	fn test_null_coalesced() {
		assert_eq!(null_coalesced("email", &DataType::Text), r#"COALESCE("email", '')"#);
		assert_eq!(null_coalesced("n", &DataType::Integer.not_null()), r#"COALESCE("n", 0)"#);
	}
}
