// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use indexmap::IndexMap;
use mongo2pg_type::{DataType, Document, Relation, Value};

use crate::{
	Atom, FieldRef, RelationRef, Result, Scope, Source, SqlError, Statement,
	atom::join_atoms,
	compile_selector,
	expression::{compile_expression, infer_type},
	ident::quote_ident,
};

/// Alias the joined table carries inside a lookup subquery.
const LOOKUP_ALIAS: &str = "__lookup";

/// A correlated fetch: every row of `from` whose `foreign_field` equals the
/// parent's `local_field`, aggregated into one JSON array column named `alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
	pub from: String,
	pub local_field: String,
	pub foreign_field: String,
	pub alias: String,
}

impl Lookup {
	/// Parses a `$lookup` stage body. The sub-pipeline form is rejected.
	pub fn parse(spec: &Value) -> Result<Self> {
		let Value::Object(spec) = spec else {
			return Err(SqlError::invalid_pipeline("$lookup requires a document"));
		};
		if spec.contains_key("pipeline") {
			return Err(SqlError::PipelineLookup);
		}
		let field = |key: &str| -> Result<String> {
			spec.get(key)
				.and_then(Value::as_str)
				.map(str::to_string)
				.ok_or_else(|| SqlError::invalid_pipeline(format!("$lookup requires a string '{key}'")))
		};
		Ok(Self {
			from: field("from")?,
			local_field: field("localField")?,
			foreign_field: field("foreignField")?,
			alias: field("as")?,
		})
	}

	/// The lateral subquery, correlated to the enclosing statement's source.
	pub fn statement(&self) -> Statement {
		let joined = quote_ident(LOOKUP_ALIAS);
		let mut statement = Statement::new(Source::None);
		statement.text(format!(
			"SELECT COALESCE(jsonb_agg(to_jsonb({joined})), '[]'::jsonb) AS {} FROM ",
			quote_ident(&self.alias)
		));
		statement.push(Atom::Relation(RelationRef::Table(self.from.clone())));
		statement.text(format!(" AS {joined} WHERE {joined}.{} = ", quote_ident(&self.foreign_field)));
		statement.push(Atom::Relation(RelationRef::Outer));
		statement.text(format!(".{}", quote_ident(&self.local_field)));
		statement.named()
	}
}

#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
	pub projection: Option<Document>,
	pub sort: Option<Document>,
	pub limit: Option<u64>,
	pub skip: Option<u64>,
	pub for_update: bool,
}

impl SelectOptions {
	pub fn with_projection(mut self, projection: Document) -> Self {
		self.projection = Some(projection);
		self
	}

	pub fn with_sort(mut self, sort: Document) -> Self {
		self.sort = Some(sort);
		self
	}

	pub fn with_limit(mut self, limit: u64) -> Self {
		self.limit = Some(limit);
		self
	}

	pub fn with_skip(mut self, skip: u64) -> Self {
		self.skip = Some(skip);
		self
	}

	pub fn for_update(mut self) -> Self {
		self.for_update = true;
		self
	}
}

/// The clauses of a select before it is tied to a source.
#[derive(Debug, Clone, Default)]
pub struct SelectParts {
	/// Empty selects every column of the source.
	pub projection: Vec<Atom>,
	pub laterals: Vec<Statement>,
	/// Join clauses appended after the FROM item, each starting with its keyword.
	pub joins: Vec<Vec<Atom>>,
	pub filter: Vec<Atom>,
	pub group_by: Vec<Atom>,
	pub order_by: Vec<Atom>,
	pub limit: Option<u64>,
	pub offset: Option<u64>,
	pub for_update: bool,
	pub synthetic: Vec<String>,
}

impl SelectParts {
	pub fn build(self, source: Source) -> Statement {
		let mut statement = Statement::new(source);
		statement.text("SELECT ");
		if !self.projection.is_empty() {
			statement.extend(self.projection);
		} else if !self.laterals.is_empty() {
			statement.text("*");
		} else {
			statement.push(Atom::Relation(RelationRef::Source));
			statement.text(".*");
		}

		statement.text(" FROM ");
		statement.push(Atom::Relation(RelationRef::From));
		for join in self.joins {
			statement.text(" ");
			statement.extend(join);
		}
		if !self.laterals.is_empty() {
			statement.set_correlated(true);
		}
		for lateral in self.laterals {
			statement.text(", LATERAL ");
			statement.push(Atom::statement(lateral));
		}

		if !self.filter.is_empty() {
			statement.text(" WHERE ");
			statement.extend(self.filter);
		}
		if !self.group_by.is_empty() {
			statement.text(" GROUP BY ");
			statement.extend(self.group_by);
		}
		if !self.order_by.is_empty() {
			statement.text(" ORDER BY ");
			statement.extend(self.order_by);
		}
		if let Some(limit) = self.limit {
			statement.text(" LIMIT ");
			statement.arg(Value::from(limit));
		}
		if let Some(offset) = self.offset {
			statement.text(" OFFSET ");
			statement.arg(Value::from(offset));
		}
		if self.for_update {
			statement.text(" FOR UPDATE");
		}

		for name in self.synthetic {
			statement.register_synthetic(name);
		}
		statement
	}
}

/// `SELECT ... FROM "relation" [WHERE ...] [ORDER BY ...] [LIMIT ...] [OFFSET ...]`.
pub fn select(relation: &Relation, selector: &Document, options: &SelectOptions) -> Result<Statement> {
	let scope = Scope::new(relation);
	let mut parts = SelectParts {
		filter: compile_selector(selector, &scope)?,
		limit: options.limit,
		offset: options.skip,
		for_update: options.for_update,
		..Default::default()
	};
	if let Some(projection) = &options.projection {
		let projected = project(projection, &scope)?;
		parts.projection = projected.atoms;
		parts.synthetic = projected.synthetic;
	}
	if let Some(order) = &options.sort {
		parts.order_by = sort(order, &scope)?;
	}
	Ok(parts.build(Source::Table(relation.name().to_string())))
}

/// `SELECT count(*) AS "count" FROM "relation" [WHERE ...]`.
pub fn count(relation: &Relation, selector: &Document) -> Result<Statement> {
	let scope = Scope::new(relation);
	let parts = SelectParts {
		projection: vec![Atom::text("count(*) AS \"count\"")],
		filter: compile_selector(selector, &scope)?,
		..Default::default()
	};
	Ok(parts.build(Source::Table(relation.name().to_string())))
}

/// `{field: 1 | -1, ...}` to an ORDER BY list.
pub fn sort(order: &Document, scope: &Scope) -> Result<Vec<Atom>> {
	let mut items = Vec::with_capacity(order.len());
	for (field, direction) in order {
		let direction = match direction.as_i64() {
			Some(1) => "ASC",
			Some(-1) => "DESC",
			_ => {
				return Err(SqlError::InvalidSort {
					message: format!("direction for '{field}' must be 1 or -1"),
				});
			}
		};
		let mut item = scope.field(field, None)?;
		item.push(Atom::text(format!(" {direction}")));
		items.push(item);
	}
	Ok(join_atoms(items, ", "))
}

/// The output of compiling a projection document.
#[derive(Debug, Clone, PartialEq)]
pub struct Projected {
	pub atoms: Vec<Atom>,
	pub synthetic: Vec<String>,
	/// Output columns and their types, in select order.
	pub fields: IndexMap<String, DataType>,
}

enum Entry<'a> {
	Include,
	Exclude,
	Compute(&'a Value),
}

fn entry(value: &Value) -> Entry<'_> {
	match value {
		Value::Bool(true) => Entry::Include,
		Value::Bool(false) => Entry::Exclude,
		Value::Number(n) if n.as_f64() == Some(0.0) => Entry::Exclude,
		Value::Number(_) => Entry::Include,
		other => Entry::Compute(other),
	}
}

/// Splits an inclusion or exclusion projection into the select list.
///
/// Inclusion keeps the identity unless it is excluded explicitly; exclusion
/// lists every remaining column; computed entries become `<expr> AS "name"`.
pub fn project(projection: &Document, scope: &Scope) -> Result<Projected> {
	let relation = scope.relation;
	let identity = relation.identity();

	let mut included: Vec<(&str, Option<&Value>)> = Vec::new();
	let mut excluded: Vec<&str> = Vec::new();
	for (name, value) in projection {
		match entry(value) {
			Entry::Include => included.push((name.as_str(), None)),
			Entry::Exclude => excluded.push(name.as_str()),
			Entry::Compute(expression) => included.push((name.as_str(), Some(expression))),
		}
	}

	let identity_only = excluded.iter().all(|name| *name == identity);
	if !included.is_empty() && !identity_only {
		return Err(SqlError::invalid_projection("cannot mix inclusion and exclusion"));
	}
	for name in &excluded {
		scope.resolve(name)?;
	}

	let mut output: Vec<(String, Vec<Atom>, DataType, bool)> = Vec::new();
	if included.is_empty() {
		for (name, data_type) in relation.fields() {
			if !excluded.contains(&name.as_str()) {
				output.push((name.clone(), scope.column(name), data_type.concrete().clone(), false));
			}
		}
	} else {
		if !excluded.contains(&identity) && !included.iter().any(|(name, _)| *name == identity) {
			if let Some(data_type) = relation.field(identity) {
				output.push((identity.to_string(), scope.column(identity), data_type.concrete().clone(), false));
			}
		}
		for (name, expression) in included {
			match expression {
				Some(expression) => {
					let atoms = compile_expression(expression, scope)?;
					output.push((name.to_string(), atoms, infer_type(expression, relation), true));
				}
				None => match scope.resolve(name)? {
					field @ FieldRef::Column {
						..
					} => {
						let data_type = field.data_type(None);
						output.push((name.to_string(), field.atoms(scope.qualifier, None), data_type, false));
					}
					field @ FieldRef::Json {
						..
					} => {
						output.push((name.to_string(), field.atoms(scope.qualifier, None), DataType::Jsonb, true));
					}
				},
			}
		}
	}

	let mut synthetic = Vec::new();
	let mut fields = IndexMap::with_capacity(output.len());
	let mut items = Vec::with_capacity(output.len());
	for (name, mut atoms, data_type, computed) in output {
		if computed {
			atoms.push(Atom::text(format!(" AS {}", quote_ident(&name))));
			synthetic.push(name.clone());
		}
		items.push(atoms);
		fields.insert(name, data_type);
	}

	Ok(Projected {
		atoms: join_atoms(items, ", "),
		synthetic,
		fields,
	})
}

#[cfg(test)]
mod tests {
	use mongo2pg_type::{DataType, Relation};
	use serde_json::json;

	use super::*;
	use crate::Qualifier;

	fn users() -> Relation {
		Relation::builder("users")
			.field("name", DataType::Text)
			.field("age", DataType::Integer)
			.field("profile", DataType::Jsonb)
			.build()
			.unwrap()
	}

	fn doc(value: Value) -> Document {
		value.as_object().unwrap().clone()
	}

	#[test]
	fn test_select_all() {
		let statement = select(&users(), &doc(json!({})), &SelectOptions::default()).unwrap();
		assert_eq!(statement.compile().sql, r#"SELECT "users".* FROM "users""#);
	}

	#[test]
	fn test_select_with_clauses() {
		let options = SelectOptions::default().with_sort(doc(json!({"age": -1, "name": 1}))).with_limit(10).with_skip(20);
		let compiled = select(&users(), &doc(json!({"age": {"$gt": 18}})), &options).unwrap().compile();
		assert_eq!(
			compiled.sql,
			r#"SELECT "users".* FROM "users" WHERE "age" > $1 ORDER BY "age" DESC, "name" ASC LIMIT $2 OFFSET $3"#
		);
		assert_eq!(compiled.args, vec![json!(18), json!(10), json!(20)]);
	}

	#[test]
	fn test_for_update() {
		let options = SelectOptions::default().for_update();
		let compiled = select(&users(), &doc(json!({"name": "a"})), &options).unwrap().compile();
		assert_eq!(compiled.sql, r#"SELECT "users".* FROM "users" WHERE "name" = $1 FOR UPDATE"#);
	}

	#[test]
	fn test_inclusion_adds_identity() {
		let options = SelectOptions::default().with_projection(doc(json!({"name": 1})));
		let statement = select(&users(), &doc(json!({})), &options).unwrap();
		assert_eq!(statement.compile().sql, r#"SELECT "_id", "name" FROM "users""#);
	}

	#[test]
	fn test_inclusion_without_identity() {
		let options = SelectOptions::default().with_projection(doc(json!({"name": 1, "_id": 0})));
		let statement = select(&users(), &doc(json!({})), &options).unwrap();
		assert_eq!(statement.compile().sql, r#"SELECT "name" FROM "users""#);
	}

	#[test]
	fn test_exclusion_lists_remaining_columns() {
		let options = SelectOptions::default().with_projection(doc(json!({"profile": 0})));
		let statement = select(&users(), &doc(json!({})), &options).unwrap();
		assert_eq!(statement.compile().sql, r#"SELECT "_id", "name", "age" FROM "users""#);
	}

	#[test]
	fn test_synthetic_fields() {
		let options = SelectOptions::default().with_projection(doc(json!({
			"name": 1,
			"next": {"$add": ["$age", 1]},
			"city": "$profile.city"
		})));
		let statement = select(&users(), &doc(json!({})), &options).unwrap();
		assert_eq!(
			statement.compile().sql,
			r#"SELECT "_id", "name", ("age" + $1::numeric) AS "next", ("profile"->'city') AS "city" FROM "users""#
		);
		assert_eq!(statement.synthetic(), &["next".to_string(), "city".to_string()]);
	}

	#[test]
	fn test_mixed_projection_fails() {
		let options = SelectOptions::default().with_projection(doc(json!({"name": 1, "age": 0})));
		assert!(matches!(select(&users(), &doc(json!({})), &options), Err(SqlError::InvalidProjection { .. })));
	}

	#[test]
	fn test_count() {
		let compiled = count(&users(), &doc(json!({"age": 3}))).unwrap().compile();
		assert_eq!(compiled.sql, r#"SELECT count(*) AS "count" FROM "users" WHERE "age" = $1"#);
	}

	#[test]
	fn test_lookup_lateral() {
		let lookup = Lookup::parse(&json!({
			"from": "posts",
			"localField": "_id",
			"foreignField": "author",
			"as": "posts"
		}))
		.unwrap();
		let parts = SelectParts {
			laterals: vec![lookup.statement()],
			..Default::default()
		};
		let statement = parts.build(Source::Table("users".to_string()));
		assert!(statement.is_correlated());
		assert_eq!(
			statement.compile().sql,
			r#"SELECT * FROM "users", LATERAL (SELECT COALESCE(jsonb_agg(to_jsonb("__lookup")), '[]'::jsonb) AS "posts" FROM "posts" AS "__lookup" WHERE "__lookup"."author" = "users"."_id") AS a"#
		);
	}

	#[test]
	fn test_pipeline_lookup_fails() {
		assert_eq!(
			Lookup::parse(&json!({"from": "posts", "pipeline": [], "as": "p"})),
			Err(SqlError::PipelineLookup)
		);
	}

	#[test]
	fn test_joins_and_qualified_sort() {
		let relation = users();
		let qualifier = Qualifier::Source;
		let order = sort(&doc(json!({"name": 1})), &Scope::qualified(&relation, &qualifier)).unwrap();
		let parts = SelectParts {
			joins: vec![vec![Atom::text(r#"LEFT JOIN "teams" AS j1 ON j1."_id" = "users"."team""#)]],
			order_by: order,
			..Default::default()
		};
		assert_eq!(
			parts.build(Source::Table("users".to_string())).compile().sql,
			r#"SELECT "users".* FROM "users" LEFT JOIN "teams" AS j1 ON j1."_id" = "users"."team" ORDER BY "users"."name" ASC"#
		);
	}
}
