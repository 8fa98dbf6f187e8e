// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use indexmap::IndexMap;
use mongo2pg_type::{DataType, Document, Relation, Value};

use crate::{
	Atom, Result, Scope, SqlError,
	atom::join_atoms,
	expression::{compile_expression, compile_numeric, infer_type, is_expression},
	ident::quote_ident,
};

/// The group key as a select item plus its GROUP BY list.
///
/// A composite key `{a: "$a", b: "$b"}` becomes one JSON object and groups by
/// each member; a constant key groups everything into one row.
fn compile_key(key: &Value, scope: &Scope) -> Result<(Vec<Atom>, Vec<Atom>)> {
	let item = compile_expression(key, scope)?;
	let group_by = match key {
		Value::Object(members) if !is_expression(key) => {
			let mut parts = Vec::with_capacity(members.len());
			for member in members.values() {
				if is_expression(member) {
					parts.push(compile_expression(member, scope)?);
				}
			}
			join_atoms(parts, ", ")
		}
		_ if is_expression(key) => compile_expression(key, scope)?,
		_ => vec![],
	};
	Ok((item, group_by))
}

fn accumulator<'a>(name: &str, value: &'a Value) -> Result<(&'a str, &'a Value)> {
	if let Value::Object(object) = value {
		let mut entries = object.iter();
		if let (Some((operator, operand)), None) = (entries.next(), entries.next()) {
			return Ok((operator.as_str(), operand));
		}
	}
	Err(SqlError::invalid_pipeline(format!("$group field '{name}' requires a single accumulator")))
}

/// Compiles `$group` into its select list and GROUP BY list.
///
/// `order` is the ORDER BY list of the rows being grouped; `$first` and `$last`
/// aggregate in that order. Without one they pick from an arbitrary order.
pub(crate) fn compile_group(group: &Document, scope: &Scope, order: &[Atom]) -> Result<(Vec<Atom>, Vec<Atom>)> {
	let Some(key) = group.get("_id") else {
		return Err(SqlError::invalid_pipeline("$group requires an _id"));
	};

	let (mut key_item, group_by) = compile_key(key, scope)?;
	key_item.push(Atom::text(" AS \"_id\""));
	let mut items = vec![key_item];

	for (name, value) in group {
		if name == "_id" {
			continue;
		}
		let (operator, operand) = accumulator(name, value)?;
		let mut item = match operator {
			"$sum" if operand.as_i64() == Some(1) => vec![Atom::text("count(*)")],
			"$sum" => call("sum(", compile_numeric(operand, scope)?, ")"),
			"$avg" => call("avg(", compile_numeric(operand, scope)?, ")"),
			"$min" => call("min(", compile_expression(operand, scope)?, ")"),
			"$max" => call("max(", compile_expression(operand, scope)?, ")"),
			"$first" => call("(array_agg(", ordered(compile_expression(operand, scope)?, order), "))[1]"),
			"$last" => call("(array_agg(", ordered(compile_expression(operand, scope)?, order), "))[count(*)]"),
			"$push" => call("jsonb_agg(", compile_expression(operand, scope)?, ")"),
			_ => return Err(SqlError::unsupported_operator(operator)),
		};
		item.push(Atom::text(format!(" AS {}", quote_ident(name))));
		items.push(item);
	}

	Ok((join_atoms(items, ", "), group_by))
}

fn ordered(mut atoms: Vec<Atom>, order: &[Atom]) -> Vec<Atom> {
	if !order.is_empty() {
		atoms.push(Atom::text(" ORDER BY "));
		atoms.extend(order.iter().cloned());
	}
	atoms
}

fn call(open: &str, inner: Vec<Atom>, close: &str) -> Vec<Atom> {
	let mut atoms = vec![Atom::text(open)];
	atoms.extend(inner);
	atoms.push(Atom::text(close));
	atoms
}

/// Output columns of a `$group` stage.
pub(crate) fn group_fields(group: &Document, relation: &Relation) -> Result<IndexMap<String, DataType>> {
	let Some(key) = group.get("_id") else {
		return Err(SqlError::invalid_pipeline("$group requires an _id"));
	};

	let mut fields = IndexMap::with_capacity(group.len());
	fields.insert("_id".to_string(), infer_type(key, relation));
	for (name, value) in group {
		if name == "_id" {
			continue;
		}
		let (operator, operand) = accumulator(name, value)?;
		let data_type = match operator {
			"$sum" if operand.as_i64() == Some(1) => DataType::BigInt,
			"$sum" | "$avg" => DataType::Numeric,
			"$push" => DataType::Jsonb,
			_ => infer_type(operand, relation),
		};
		fields.insert(name.clone(), data_type);
	}
	Ok(fields)
}
