// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use mongo2pg_type::{Document, ValueKind, is_operator_key};
use serde_json::Value;

use crate::{
	Atom, FieldRef, Result, Scope, SqlError,
	atom::{join_atoms, parenthesize},
};

/// Compiles a selector into the atoms of a WHERE condition.
///
/// An empty result means the selector matches everything and the caller omits
/// the WHERE clause.
pub fn compile_selector(selector: &Document, scope: &Scope) -> Result<Vec<Atom>> {
	let mut clauses = Vec::with_capacity(selector.len());
	for (key, value) in selector {
		clauses.push(compile_entry(key, value, scope)?);
	}
	Ok(combine(clauses, " AND "))
}

fn combine(clauses: Vec<Vec<Atom>>, separator: &str) -> Vec<Atom> {
	let mut clauses: Vec<Vec<Atom>> = clauses.into_iter().filter(|c| !c.is_empty()).collect();
	match clauses.len() {
		0 => vec![],
		1 => clauses.remove(0),
		_ => parenthesize(join_atoms(clauses, separator)),
	}
}

fn compile_entry(key: &str, value: &Value, scope: &Scope) -> Result<Vec<Atom>> {
	match key {
		"$and" => Ok(combine(compile_operands(key, value, scope)?, " AND ")),
		"$or" => {
			// an always-true operand makes the whole disjunction always true
			let operands = compile_operands(key, value, scope)?;
			if operands.iter().any(Vec::is_empty) {
				return Ok(vec![]);
			}
			Ok(combine(operands, " OR "))
		}
		"$nor" => {
			let operands = compile_operands(key, value, scope)?;
			if operands.iter().any(Vec::is_empty) {
				return Ok(vec![Atom::text("FALSE")]);
			}
			let mut atoms = vec![Atom::text("NOT ")];
			atoms.extend(parenthesize(join_atoms(operands, " OR ")));
			Ok(atoms)
		}
		"$comment" => Ok(vec![]),
		_ if is_operator_key(key) => Err(SqlError::unsupported_operator(key)),
		_ => compile_field(key, value, scope),
	}
}

/// `$and`, `$or` and `$nor` take either an array of selectors or a single
/// selector whose keys each count as one operand.
fn compile_operands(operator: &str, value: &Value, scope: &Scope) -> Result<Vec<Vec<Atom>>> {
	let mut clauses = Vec::new();
	match value {
		Value::Array(items) => {
			if items.is_empty() {
				return Err(SqlError::invalid_selector(format!("{operator} requires a non-empty array")));
			}
			for item in items {
				let Value::Object(selector) = item else {
					return Err(SqlError::invalid_selector(format!(
						"{operator} operands must be selectors"
					)));
				};
				clauses.push(compile_selector(selector, scope)?);
			}
		}
		Value::Object(selector) => {
			for (key, value) in selector {
				clauses.push(compile_entry(key, value, scope)?);
			}
		}
		_ => {
			return Err(SqlError::invalid_selector(format!("{operator} requires an array or a selector")));
		}
	}
	Ok(clauses)
}

fn compile_field(name: &str, value: &Value, scope: &Scope) -> Result<Vec<Atom>> {
	let field = scope.resolve(name)?;

	if let Value::Object(object) = value {
		let operators = object.keys().filter(|k| is_operator_key(k)).count();
		if operators > 0 && operators < object.len() {
			return Err(SqlError::invalid_selector(format!(
				"field '{name}' mixes operators and plain keys"
			)));
		}
		if operators > 0 {
			let mut clauses = Vec::with_capacity(object.len());
			for (operator, operand) in object {
				clauses.push(compile_operator(&field, operator, operand, scope)?);
			}
			return Ok(combine(clauses, " AND "));
		}
	}

	compile_eq(&field, value, scope)
}

fn compile_operator(field: &FieldRef, operator: &str, operand: &Value, scope: &Scope) -> Result<Vec<Atom>> {
	match operator {
		"$eq" => compile_eq(field, operand, scope),
		"$ne" => compile_ne(field, operand, scope),
		"$lt" => compile_ordering(field, "<", operator, operand, scope),
		"$lte" => compile_ordering(field, "<=", operator, operand, scope),
		"$gt" => compile_ordering(field, ">", operator, operand, scope),
		"$gte" => compile_ordering(field, ">=", operator, operand, scope),
		"$in" => compile_in(field, operand, scope),
		"$nin" => compile_nin(field, operand, scope),
		"$exists" => {
			let mut atoms = field.atoms(scope.qualifier, None);
			atoms.push(Atom::text(if truthy(operand) {
				" IS NOT NULL"
			} else {
				" IS NULL"
			}));
			Ok(atoms)
		}
		_ => Err(SqlError::unsupported_operator(operator)),
	}
}

fn compile_eq(field: &FieldRef, value: &Value, scope: &Scope) -> Result<Vec<Atom>> {
	if value.is_null() {
		let mut atoms = field.atoms(scope.qualifier, None);
		atoms.push(Atom::text(" IS NULL"));
		return Ok(atoms);
	}

	if field.is_array() && !value.is_array() {
		return Ok(contains(field, value, scope));
	}

	let kind = ValueKind::of(value);
	let mut atoms = field.atoms(scope.qualifier, Some(kind));
	atoms.push(Atom::text(" = "));
	atoms.extend(operand(field, value));
	Ok(atoms)
}

fn compile_ne(field: &FieldRef, value: &Value, scope: &Scope) -> Result<Vec<Atom>> {
	if value.is_null() {
		let mut atoms = field.atoms(scope.qualifier, None);
		atoms.push(Atom::text(" IS NOT NULL"));
		return Ok(atoms);
	}

	if field.is_array() && !value.is_array() {
		let mut atoms = vec![Atom::text("(")];
		atoms.extend(field.atoms(scope.qualifier, None));
		atoms.push(Atom::text(" IS NULL OR NOT "));
		atoms.extend(parenthesize(contains(field, value, scope)));
		atoms.push(Atom::text(")"));
		return Ok(atoms);
	}

	let kind = ValueKind::of(value);
	let mut atoms = field.atoms(scope.qualifier, Some(kind));
	atoms.push(Atom::text(" IS DISTINCT FROM "));
	atoms.extend(operand(field, value));
	Ok(atoms)
}

fn compile_ordering(
	field: &FieldRef,
	comparison: &str,
	operator: &str,
	value: &Value,
	scope: &Scope,
) -> Result<Vec<Atom>> {
	if value.is_null() {
		return Err(SqlError::invalid_selector(format!("{operator} cannot compare against null")));
	}
	let kind = ValueKind::of(value);
	let mut atoms = field.atoms(scope.qualifier, Some(kind));
	atoms.push(Atom::text(format!(" {comparison} ")));
	atoms.extend(operand(field, value));
	Ok(atoms)
}

fn compile_in(field: &FieldRef, value: &Value, scope: &Scope) -> Result<Vec<Atom>> {
	let (values, has_null) = split_nulls("$in", value)?;
	let kind = values.first().map(|v| ValueKind::of(v));

	let mut clauses = Vec::with_capacity(2);
	if !values.is_empty() {
		let mut atoms = field.atoms(scope.qualifier, kind);
		if field.is_array() {
			atoms.push(Atom::text(" && "));
		} else {
			atoms.push(Atom::text(" = ANY("));
		}
		atoms.extend(array(field, &values, kind));
		if !field.is_array() {
			atoms.push(Atom::text(")"));
		}
		clauses.push(atoms);
	}
	if has_null {
		let mut atoms = field.atoms(scope.qualifier, None);
		atoms.push(Atom::text(" IS NULL"));
		clauses.push(atoms);
	}

	if clauses.is_empty() {
		return Ok(vec![Atom::text("FALSE")]);
	}
	Ok(combine(clauses, " OR "))
}

/// A missing value matches `$nin` unless the list itself holds `null`.
fn compile_nin(field: &FieldRef, value: &Value, scope: &Scope) -> Result<Vec<Atom>> {
	let (values, has_null) = split_nulls("$nin", value)?;
	let kind = values.first().map(|v| ValueKind::of(v));

	if values.is_empty() {
		if has_null {
			let mut atoms = field.atoms(scope.qualifier, None);
			atoms.push(Atom::text(" IS NOT NULL"));
			return Ok(atoms);
		}
		return Ok(vec![Atom::text("TRUE")]);
	}

	let mut atoms = vec![Atom::text("(")];
	atoms.extend(field.atoms(scope.qualifier, None));
	atoms.push(Atom::text(if has_null {
		" IS NOT NULL AND "
	} else {
		" IS NULL OR "
	}));
	if field.is_array() {
		atoms.push(Atom::text("NOT ("));
		atoms.extend(field.atoms(scope.qualifier, kind));
		atoms.push(Atom::text(" && "));
		atoms.extend(array(field, &values, kind));
		atoms.push(Atom::text(")"));
	} else {
		atoms.extend(field.atoms(scope.qualifier, kind));
		atoms.push(Atom::text(" <> ALL("));
		atoms.extend(array(field, &values, kind));
		atoms.push(Atom::text(")"));
	}
	atoms.push(Atom::text(")"));
	Ok(atoms)
}

fn split_nulls<'v>(operator: &str, value: &'v Value) -> Result<(Vec<&'v Value>, bool)> {
	let Value::Array(items) = value else {
		return Err(SqlError::invalid_selector(format!("{operator} requires an array")));
	};
	let has_null = items.iter().any(Value::is_null);
	Ok((items.iter().filter(|v| !v.is_null()).collect(), has_null))
}

/// `ARRAY[$1,$2]::<type>[]`, typed after the column so the driver can bind it.
fn array(field: &FieldRef, values: &[&Value], kind: Option<ValueKind>) -> Vec<Atom> {
	let element = match field.data_type(kind).element() {
		Some(element) => element.sql_name(),
		None => field.data_type(kind).sql_name(),
	};
	let mut atoms = vec![Atom::text("ARRAY[")];
	for (i, value) in values.iter().enumerate() {
		if i > 0 {
			atoms.push(Atom::text(","));
		}
		atoms.push(Atom::arg((*value).clone()));
	}
	atoms.push(Atom::text(format!("]::{element}[]")));
	atoms
}

/// `$n = ANY("col")` for a scalar compared to an array column.
fn contains(field: &FieldRef, value: &Value, scope: &Scope) -> Vec<Atom> {
	let mut atoms = vec![Atom::arg(value.clone()), Atom::text(" = ANY(")];
	atoms.extend(field.atoms(scope.qualifier, None));
	atoms.push(Atom::text(")"));
	atoms
}

/// The bound comparison operand. JSON comparisons bind the value as `jsonb`.
fn operand(field: &FieldRef, value: &Value) -> Vec<Atom> {
	let json = match field {
		FieldRef::Column {
			..
		} => field.is_json(),
		FieldRef::Json {
			..
		} => matches!(ValueKind::of(value), ValueKind::Array | ValueKind::Object),
	};
	let mut atoms = vec![Atom::arg(value.clone())];
	if json {
		atoms.push(Atom::text("::jsonb"));
	}
	atoms
}

fn truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(b) => *b,
		Value::Number(n) => n.as_f64() != Some(0.0),
		_ => true,
	}
}

#[cfg(test)]
mod tests {
	use mongo2pg_type::{DataType, Relation};
	use serde_json::json;

	use super::*;
	use crate::{Compiled, Qualifier, Source, Statement};

	fn relation() -> Relation {
		Relation::builder("t")
			.field("a", DataType::Integer)
			.field("b", DataType::Integer)
			.field("name", DataType::Text)
			.field("meta", DataType::Jsonb)
			.field("tags", DataType::array(DataType::Text))
			.build()
			.unwrap()
	}

	fn compile(selector: Value) -> Result<Compiled> {
		let relation = relation();
		let atoms = compile_selector(selector.as_object().unwrap(), &Scope::new(&relation))?;
		let mut statement = Statement::new(Source::Table("t".to_string()));
		statement.extend(atoms);
		Ok(statement.compile())
	}

	fn sql(selector: Value) -> String {
		compile(selector).unwrap().sql
	}

	#[test]
	fn test_empty_selector() {
		assert_eq!(sql(json!({})), "");
		assert_eq!(sql(json!({"$comment": "x"})), "");
	}

	#[test]
	fn test_equality() {
		let compiled = compile(json!({"a": 1})).unwrap();
		assert_eq!(compiled.sql, r#""a" = $1"#);
		assert_eq!(compiled.args, vec![json!(1)]);
	}

	#[test]
	fn test_implicit_and_matches_explicit_forms() {
		let implicit = compile(json!({"a": 1, "b": 2})).unwrap();
		let array = compile(json!({"$and": [{"a": 1}, {"b": 2}]})).unwrap();
		let object = compile(json!({"$and": {"a": 1, "b": 2}})).unwrap();

		assert_eq!(implicit.sql, r#"("a" = $1 AND "b" = $2)"#);
		assert_eq!(implicit, array);
		assert_eq!(implicit, object);
	}

	#[test]
	fn test_or_and_nor() {
		assert_eq!(sql(json!({"$or": [{"a": 1}, {"b": 2}]})), r#"("a" = $1 OR "b" = $2)"#);
		assert_eq!(sql(json!({"$nor": [{"a": 1}, {"b": 2}]})), r#"NOT ("a" = $1 OR "b" = $2)"#);
		assert_eq!(sql(json!({"$nor": [{"a": 1}]})), r#"NOT ("a" = $1)"#);
	}

	#[test]
	fn test_always_true_operands() {
		assert_eq!(sql(json!({"$or": [{}, {"a": 5}]})), "");
		assert_eq!(sql(json!({"$or": [{"$comment": "x"}, {"a": 5}]})), "");
		assert_eq!(sql(json!({"$or": [{"a": 5}], "b": 1})), r#"("a" = $1 AND "b" = $2)"#);
		assert_eq!(sql(json!({"$nor": [{}, {"a": 5}]})), "FALSE");
		assert_eq!(sql(json!({"$nor": [{"$comment": "x"}], "b": 1})), r#"(FALSE AND "b" = $1)"#);
		assert_eq!(sql(json!({"$and": [{}, {"a": 5}]})), r#""a" = $1"#);
	}

	#[test]
	fn test_nulls() {
		assert_eq!(sql(json!({"a": null})), r#""a" IS NULL"#);
		assert_eq!(sql(json!({"a": {"$ne": null}})), r#""a" IS NOT NULL"#);
		assert_eq!(sql(json!({"a": {"$ne": 3}})), r#""a" IS DISTINCT FROM $1"#);
	}

	#[test]
	fn test_ranges_are_anded() {
		let compiled = compile(json!({"a": {"$gte": 1, "$lt": 10}})).unwrap();
		assert_eq!(compiled.sql, r#"("a" >= $1 AND "a" < $2)"#);
		assert_eq!(compiled.args, vec![json!(1), json!(10)]);
	}

	#[test]
	fn test_in_over_numeric_column() {
		let compiled = compile(json!({"a": {"$in": [1, 2, 3]}})).unwrap();
		assert_eq!(compiled.sql, r#""a" = ANY(ARRAY[$1,$2,$3]::integer[])"#);
		assert_eq!(compiled.args, vec![json!(1), json!(2), json!(3)]);
	}

	#[test]
	fn test_in_with_null_and_empty() {
		assert_eq!(sql(json!({"a": {"$in": [1, null]}})), r#"("a" = ANY(ARRAY[$1]::integer[]) OR "a" IS NULL)"#);
		assert_eq!(sql(json!({"a": {"$in": []}})), "FALSE");
	}

	#[test]
	fn test_nin() {
		assert_eq!(
			sql(json!({"name": {"$nin": ["x", "y"]}})),
			r#"("name" IS NULL OR "name" <> ALL(ARRAY[$1,$2]::text[]))"#
		);
		assert_eq!(sql(json!({"a": {"$nin": []}})), "TRUE");
	}

	#[test]
	fn test_exists() {
		assert_eq!(sql(json!({"a": {"$exists": true}})), r#""a" IS NOT NULL"#);
		assert_eq!(sql(json!({"a": {"$exists": 0}})), r#""a" IS NULL"#);
	}

	#[test]
	fn test_array_column() {
		assert_eq!(sql(json!({"tags": "rust"})), r#"$1 = ANY("tags")"#);
		assert_eq!(sql(json!({"tags": {"$in": ["a", "b"]}})), r#""tags" && ARRAY[$1,$2]::text[]"#);
	}

	#[test]
	fn test_json_descent() {
		assert_eq!(sql(json!({"meta.views": {"$gt": 10}})), r#"("meta"->>'views')::numeric > $1"#);
		assert_eq!(sql(json!({"meta.author.name": "ann"})), r#"("meta"->'author'->>'name') = $1"#);
		assert_eq!(sql(json!({"meta.flags": ["x"]})), r#"("meta"->'flags')::jsonb = $1::jsonb"#);
		assert_eq!(sql(json!({"meta": {"a": 1}})), r#""meta" = $1::jsonb"#);
	}

	#[test]
	fn test_qualified() {
		let relation = relation();
		let qualifier = Qualifier::Source;
		let atoms = compile_selector(json!({"a": 1}).as_object().unwrap(), &Scope::qualified(&relation, &qualifier))
			.unwrap();
		let mut statement = Statement::new(Source::Table("t".to_string()));
		statement.extend(atoms);
		assert_eq!(statement.compile().sql, r#""t"."a" = $1"#);
	}

	#[test]
	fn test_errors() {
		assert_eq!(compile(json!({"missing": 1})), Err(SqlError::unknown_field("t", "missing")));
		assert_eq!(compile(json!({"$where": "x"})), Err(SqlError::unsupported_operator("$where")));
		assert_eq!(compile(json!({"a": {"$regex": "x"}})), Err(SqlError::unsupported_operator("$regex")));
		assert!(matches!(compile(json!({"a": {"$gt": 1, "b": 2}})), Err(SqlError::InvalidSelector { .. })));
		assert!(matches!(compile(json!({"a": {"$in": 3}})), Err(SqlError::InvalidSelector { .. })));
	}
}
