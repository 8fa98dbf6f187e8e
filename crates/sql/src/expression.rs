// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Computed values: `$project` entries, `$set` values carrying operators and
//! `$group` keys and accumulators.

use mongo2pg_type::{DataType, Relation, ValueKind, is_operator_key};
use serde_json::Value;

use crate::{
	Atom, FieldRef, Result, Scope, SqlError,
	atom::{join_atoms, parenthesize},
	ident::quote_literal,
	resolve_field,
};

/// A string starting with a single `$` references a field: `"$price"`.
pub fn field_reference(value: &Value) -> Option<&str> {
	match value {
		Value::String(s) if s.starts_with('$') && !s.starts_with("$$") && s.len() > 1 => Some(&s[1..]),
		_ => None,
	}
}

/// Whether a value has to be compiled as an expression rather than bound as a literal.
pub fn is_expression(value: &Value) -> bool {
	match value {
		Value::Object(object) => object.keys().any(|k| is_operator_key(k)),
		_ => field_reference(value).is_some(),
	}
}

pub fn compile_expression(expression: &Value, scope: &Scope) -> Result<Vec<Atom>> {
	compile(expression, scope, None)
}

/// Like [`compile_expression`], reading JSON descent as a number.
pub fn compile_numeric(expression: &Value, scope: &Scope) -> Result<Vec<Atom>> {
	compile(expression, scope, Some(ValueKind::Number))
}

fn compile(expression: &Value, scope: &Scope, hint: Option<ValueKind>) -> Result<Vec<Atom>> {
	if let Some(name) = field_reference(expression) {
		return scope.field(name, hint);
	}

	match expression {
		Value::Object(object) if object.keys().any(|k| is_operator_key(k)) => {
			let mut entries = object.iter();
			match (entries.next(), entries.next()) {
				(Some((operator, operand)), None) => compile_operator(operator, operand, scope),
				_ => Err(SqlError::invalid_expression("an operator expression takes exactly one operator key")),
			}
		}
		Value::Object(object) => {
			let mut pairs = Vec::with_capacity(object.len());
			for (key, value) in object {
				let mut pair = vec![Atom::text(quote_literal(key)), Atom::text(", ")];
				pair.extend(compile(value, scope, None)?);
				pairs.push(pair);
			}
			if pairs.is_empty() {
				return Ok(vec![Atom::text("'{}'::jsonb")]);
			}
			let mut atoms = vec![Atom::text("jsonb_build_object(")];
			atoms.extend(join_atoms(pairs, ", "));
			atoms.push(Atom::text(")"));
			Ok(atoms)
		}
		other => Ok(literal(other)),
	}
}

/// A bound literal cast after its runtime kind.
pub(crate) fn literal(value: &Value) -> Vec<Atom> {
	let cast = match ValueKind::of(value) {
		ValueKind::Null => return vec![Atom::text("NULL")],
		ValueKind::Boolean => "::boolean",
		ValueKind::Number => "::numeric",
		ValueKind::String => "::text",
		ValueKind::Array | ValueKind::Object => "::jsonb",
	};
	vec![Atom::arg(value.clone()), Atom::text(cast)]
}

fn compile_operator(operator: &str, operand: &Value, scope: &Scope) -> Result<Vec<Atom>> {
	let number = Some(ValueKind::Number);
	match operator {
		"$add" => infix(operator, operand, scope, " + ", number, 1..),
		"$subtract" => infix(operator, operand, scope, " - ", number, 2..3),
		"$multiply" => infix(operator, operand, scope, " * ", number, 1..),
		"$divide" => {
			let [dividend, divisor] = fixed::<2>(operator, operand)?;
			let mut atoms = vec![Atom::text("(CAST(")];
			atoms.extend(compile(dividend, scope, number)?);
			atoms.push(Atom::text(" AS numeric) / "));
			atoms.extend(compile(divisor, scope, number)?);
			atoms.push(Atom::text(")"));
			Ok(atoms)
		}
		"$mod" => call("MOD", operator, operand, scope, number, 2..3),
		"$abs" => call("ABS", operator, operand, scope, number, 1..2),
		"$concat" => infix(operator, operand, scope, " || ", Some(ValueKind::String), 1..),
		"$ifNull" => call("COALESCE", operator, operand, scope, None, 2..),
		"$and" => infix(operator, operand, scope, " AND ", Some(ValueKind::Boolean), 1..),
		"$or" => infix(operator, operand, scope, " OR ", Some(ValueKind::Boolean), 1..),
		"$not" => {
			let [inner] = fixed::<1>(operator, operand)?;
			let mut atoms = vec![Atom::text("(NOT ")];
			atoms.extend(compile(inner, scope, Some(ValueKind::Boolean))?);
			atoms.push(Atom::text(")"));
			Ok(atoms)
		}
		"$eq" => comparison(operator, operand, scope, " = "),
		"$ne" => comparison(operator, operand, scope, " IS DISTINCT FROM "),
		"$gt" => comparison(operator, operand, scope, " > "),
		"$gte" => comparison(operator, operand, scope, " >= "),
		"$lt" => comparison(operator, operand, scope, " < "),
		"$lte" => comparison(operator, operand, scope, " <= "),
		"$cond" => {
			let (condition, then, otherwise) = match operand {
				Value::Array(items) if items.len() == 3 => (&items[0], &items[1], &items[2]),
				Value::Object(branches) => match (branches.get("if"), branches.get("then"), branches.get("else")) {
					(Some(condition), Some(then), Some(otherwise)) if branches.len() == 3 => {
						(condition, then, otherwise)
					}
					_ => {
						return Err(SqlError::invalid_expression("$cond requires if, then and else"));
					}
				},
				_ => return Err(SqlError::invalid_expression("$cond requires if, then and else")),
			};
			let mut atoms = vec![Atom::text("CASE WHEN ")];
			atoms.extend(compile(condition, scope, Some(ValueKind::Boolean))?);
			atoms.push(Atom::text(" THEN "));
			atoms.extend(compile(then, scope, None)?);
			atoms.push(Atom::text(" ELSE "));
			atoms.extend(compile(otherwise, scope, None)?);
			atoms.push(Atom::text(" END"));
			Ok(atoms)
		}
		"$literal" => Ok(literal(operand)),
		_ => Err(SqlError::unsupported_operator(operator)),
	}
}

/// Operands of an operator: an array, or a lone value standing for a
/// one-element array.
fn operands(operand: &Value) -> Vec<&Value> {
	match operand {
		Value::Array(items) => items.iter().collect(),
		other => vec![other],
	}
}

fn fixed<'v, const N: usize>(operator: &str, operand: &'v Value) -> Result<[&'v Value; N]> {
	operands(operand)
		.try_into()
		.map_err(|_| SqlError::invalid_expression(format!("{operator} takes exactly {N} operands")))
}

fn checked<'v>(
	operator: &str,
	operand: &'v Value,
	arity: impl std::ops::RangeBounds<usize>,
) -> Result<Vec<&'v Value>> {
	let operands = operands(operand);
	if !arity.contains(&operands.len()) {
		return Err(SqlError::invalid_expression(format!(
			"{operator} got an unexpected number of operands ({})",
			operands.len()
		)));
	}
	Ok(operands)
}

fn infix(
	operator: &str,
	operand: &Value,
	scope: &Scope,
	separator: &str,
	hint: Option<ValueKind>,
	arity: impl std::ops::RangeBounds<usize>,
) -> Result<Vec<Atom>> {
	let mut parts = Vec::new();
	for operand in checked(operator, operand, arity)? {
		parts.push(compile(operand, scope, hint)?);
	}
	Ok(parenthesize(join_atoms(parts, separator)))
}

fn call(
	function: &str,
	operator: &str,
	operand: &Value,
	scope: &Scope,
	hint: Option<ValueKind>,
	arity: impl std::ops::RangeBounds<usize>,
) -> Result<Vec<Atom>> {
	let mut parts = Vec::new();
	for operand in checked(operator, operand, arity)? {
		parts.push(compile(operand, scope, hint)?);
	}
	let mut atoms = vec![Atom::text(format!("{function}("))];
	atoms.extend(join_atoms(parts, ", "));
	atoms.push(Atom::text(")"));
	Ok(atoms)
}

/// Field references compared against a literal are cast after the literal's kind.
fn comparison(operator: &str, operand: &Value, scope: &Scope, comparator: &str) -> Result<Vec<Atom>> {
	let [left, right] = fixed::<2>(operator, operand)?;
	let hint = |other: &Value| {
		if is_expression(other) {
			None
		} else {
			Some(ValueKind::of(other))
		}
	};
	let mut atoms = vec![Atom::text("(")];
	atoms.extend(compile(left, scope, hint(right))?);
	atoms.push(Atom::text(comparator));
	atoms.extend(compile(right, scope, hint(left))?);
	atoms.push(Atom::text(")"));
	Ok(atoms)
}

/// Static type of an expression's result, used to type the columns of a derived
/// relation.
pub fn infer_type(expression: &Value, relation: &Relation) -> DataType {
	if let Some(name) = field_reference(expression) {
		return match resolve_field(relation, name) {
			Ok(FieldRef::Column {
				data_type,
				..
			}) => data_type.concrete().clone(),
			_ => DataType::Jsonb,
		};
	}

	match expression {
		Value::Object(object) if object.len() == 1 => match object.iter().next() {
			Some((operator, operand)) if is_operator_key(operator) => match operator.as_str() {
				"$add" | "$subtract" | "$multiply" | "$divide" | "$mod" | "$abs" => DataType::Numeric,
				"$concat" => DataType::Text,
				"$and" | "$or" | "$not" | "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {
					DataType::Boolean
				}
				"$literal" => ValueKind::of(operand).data_type(),
				"$ifNull" => operands(operand).first().map_or(DataType::Jsonb, |v| infer_type(v, relation)),
				"$cond" => match operand {
					Value::Array(items) if items.len() == 3 => infer_type(&items[1], relation),
					Value::Object(branches) => {
						branches.get("then").map_or(DataType::Jsonb, |v| infer_type(v, relation))
					}
					_ => DataType::Jsonb,
				},
				_ => DataType::Jsonb,
			},
			_ => DataType::Jsonb,
		},
		other => ValueKind::of(other).data_type(),
	}
}
