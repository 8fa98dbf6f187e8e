// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use indexmap::IndexMap;
use mongo2pg_sql::{
	Atom, Qualifier, Scope, SelectParts, Source, Statement, compile_selector, expression::compile_expression,
	quote_ident, quote_literal,
};
use mongo2pg_type::{Document, Relation};
use tracing::{debug, instrument};

use crate::{Entry, Fragment, FragmentError, FragmentSource, Link, Resolver, Result, Schema};

/// `jsonb_build_object` takes at most 100 arguments, i.e. 50 key/value pairs.
const PAIRS_PER_OBJECT: usize = 50;

/// Name of the column [`CompiledFragment::select`] returns the document in.
pub const OUTPUT_COLUMN: &str = "data";

/// A field that application code computes after the query ran.
///
/// The columns it requires are projected next to it in the same object.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeResolver {
	/// Output keys from the root document down to the field.
	pub path: Vec<String>,
	pub requires: Vec<String>,
}

/// A fragment compiled against its base relation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFragment {
	relation: String,
	object: Vec<Atom>,
	joins: Vec<Vec<Atom>>,
	code: Vec<CodeResolver>,
}

impl CompiledFragment {
	pub fn relation(&self) -> &str {
		&self.relation
	}

	/// The `jsonb` expression producing one document per base row.
	pub fn object(&self) -> &[Atom] {
		&self.object
	}

	/// `LEFT JOIN` clauses the object reads from, one per distinct link.
	pub fn joins(&self) -> &[Vec<Atom>] {
		&self.joins
	}

	pub fn code_resolvers(&self) -> &[CodeResolver] {
		&self.code
	}

	/// `SELECT <object> AS "data" FROM <base> <joins> [WHERE ...]`, with the
	/// selector qualified by the base relation's name.
	pub fn select(&self, schema: &Schema, selector: &Document) -> Result<Statement> {
		let relation = schema.get(&self.relation)?;
		let qualifier = Qualifier::Table(self.relation.clone());
		let scope = Scope::qualified(relation, &qualifier);

		let mut projection = self.object.clone();
		projection.push(Atom::text(format!(" AS {}", quote_ident(OUTPUT_COLUMN))));

		let parts = SelectParts {
			projection,
			joins: self.joins.clone(),
			filter: compile_selector(selector, &scope)?,
			..Default::default()
		};
		Ok(parts.build(Source::Table(self.relation.clone())))
	}
}

/// A deduplicated `LEFT JOIN`: two picks over the same link from the same
/// parent share one alias.
#[derive(Debug, Clone)]
struct JoinSpec {
	relation: String,
	correlation: Correlation,
	alias: String,
	clause: Vec<Atom>,
}

#[derive(Debug, Clone, PartialEq)]
struct Correlation {
	parent: Qualifier,
	local_field: String,
	foreign_field: String,
}

/// The joins of one query level. The root select has one, and so has every
/// correlated sub-select of a to-many pick.
#[derive(Debug, Default)]
struct Context {
	joins: Vec<JoinSpec>,
}

struct Compiler<'a> {
	schema: &'a Schema,
	fragments: &'a dyn FragmentSource,
	joined: usize,
	nested: usize,
	spreading: Vec<String>,
	code: Vec<CodeResolver>,
}

/// Compiles `fragment` against its relation in `schema`, resolving spreads
/// through `fragments`.
#[instrument(name = "fragment::compile", level = "debug", skip_all, fields(fragment = %fragment.name))]
pub fn compile_fragment(
	schema: &Schema,
	fragments: &dyn FragmentSource,
	fragment: &Fragment,
) -> Result<CompiledFragment> {
	let relation = schema.get(&fragment.relation)?;
	let qualifier = Qualifier::Table(relation.name().to_string());

	let mut compiler = Compiler {
		schema,
		fragments,
		joined: 0,
		nested: 0,
		spreading: vec![fragment.name.clone()],
		code: vec![],
	};
	let mut context = Context::default();
	let pairs = compiler.entries(&mut context, relation, &qualifier, &fragment.entries, &[])?;

	debug!(joins = context.joins.len(), nested = compiler.nested, "compiled fragment");
	Ok(CompiledFragment {
		relation: relation.name().to_string(),
		object: object(pairs)?,
		joins: context.joins.into_iter().map(|join| join.clause).collect(),
		code: compiler.code,
	})
}

impl Compiler<'_> {
	fn entries(
		&mut self,
		context: &mut Context,
		relation: &Relation,
		qualifier: &Qualifier,
		entries: &[Entry],
		path: &[String],
	) -> Result<IndexMap<String, Vec<Atom>>> {
		let mut pairs = IndexMap::with_capacity(entries.len());
		for entry in entries {
			match entry {
				Entry::Field {
					name,
					alias,
				} => {
					let key = alias.as_ref().unwrap_or(name);
					self.field(relation, qualifier, name, key, path, &mut pairs)?;
				}
				Entry::Spread {
					name,
				} => {
					let fragments = self.fragments;
					let Some(fragment) = fragments.get_fragment(name) else {
						return Err(FragmentError::UnknownFragment {
							name: name.clone(),
						});
					};
					if self.spreading.contains(name) {
						return Err(FragmentError::RecursiveSpread {
							name: name.clone(),
						});
					}
					if fragment.relation != relation.name() {
						return Err(FragmentError::RelationMismatch {
							fragment: name.clone(),
							expected: fragment.relation.clone(),
							relation: relation.name().to_string(),
						});
					}
					self.spreading.push(name.clone());
					let spread = self.entries(context, relation, qualifier, &fragment.entries, path)?;
					self.spreading.pop();
					pairs.extend(spread);
				}
				Entry::Pick {
					name,
					alias,
					entries,
				} => {
					let key = alias.as_ref().unwrap_or(name);
					let mut nested_path = path.to_vec();
					nested_path.push(key.clone());
					let value = match self.schema.resolver(relation, name)? {
						Resolver::ToOne(link) => {
							self.to_one(context, relation, qualifier, &link, entries, &nested_path)?
						}
						Resolver::ToMany(link) => self.to_many(relation, qualifier, &link, entries, &nested_path)?,
						_ => {
							return Err(FragmentError::NotALink {
								relation: relation.name().to_string(),
								field: name.clone(),
							});
						}
					};
					pairs.insert(key.clone(), value);
				}
			}
		}
		Ok(pairs)
	}

	fn field(
		&mut self,
		relation: &Relation,
		qualifier: &Qualifier,
		name: &str,
		key: &str,
		path: &[String],
		pairs: &mut IndexMap<String, Vec<Atom>>,
	) -> Result<()> {
		let scope = Scope::qualified(relation, qualifier);
		match self.schema.resolver(relation, name)? {
			Resolver::Column(column) => {
				pairs.insert(key.to_string(), scope.field(&column, None)?);
			}
			Resolver::Expression(expression) => {
				pairs.insert(key.to_string(), compile_expression(&expression, &scope)?);
			}
			Resolver::Code {
				requires,
			} => {
				for column in &requires {
					if !pairs.contains_key(column) {
						pairs.insert(column.clone(), scope.field(column, None)?);
					}
				}
				let mut path = path.to_vec();
				path.extend(key.split('.').map(str::to_string));
				self.code.push(CodeResolver {
					path,
					requires,
				});
			}
			Resolver::ToOne(_) | Resolver::ToMany(_) => {
				return Err(FragmentError::MissingSelection {
					relation: relation.name().to_string(),
					field: name.to_string(),
				});
			}
		}
		Ok(())
	}

	/// `CASE WHEN j."_id" IS NOT NULL THEN <object> ELSE NULL END` over a
	/// shared left join, so a missing row yields `null`.
	fn to_one(
		&mut self,
		context: &mut Context,
		relation: &Relation,
		qualifier: &Qualifier,
		link: &Link,
		entries: &[Entry],
		path: &[String],
	) -> Result<Vec<Atom>> {
		let schema = self.schema;
		let target = schema.get(&link.relation)?;
		let alias = self.join(context, relation, qualifier, link, target)?;
		let joined = Qualifier::Alias(alias.clone());
		let pairs = self.entries(context, target, &joined, entries, path)?;

		let mut atoms = vec![Atom::text(format!("CASE WHEN {alias}.{} IS NOT NULL THEN ", quote_ident(target.identity())))];
		atoms.extend(object(pairs)?);
		atoms.push(Atom::text(" ELSE NULL END"));
		Ok(atoms)
	}

	fn join(
		&mut self,
		context: &mut Context,
		relation: &Relation,
		qualifier: &Qualifier,
		link: &Link,
		target: &Relation,
	) -> Result<String> {
		let correlation = Correlation {
			parent: qualifier.clone(),
			local_field: link.local_field.clone(),
			foreign_field: link.foreign_field.clone(),
		};
		if let Some(existing) =
			context.joins.iter().find(|join| join.relation == link.relation && join.correlation == correlation)
		{
			return Ok(existing.alias.clone());
		}

		let local = Scope::qualified(relation, qualifier).field(&link.local_field, None)?;
		self.joined += 1;
		let alias = format!("j{}", self.joined);
		let joined = Qualifier::Alias(alias.clone());
		let foreign = Scope::qualified(target, &joined).field(&link.foreign_field, None)?;

		let mut clause = vec![Atom::text(format!("LEFT JOIN {} AS {alias} ON ", quote_ident(target.name())))];
		clause.extend(foreign);
		clause.push(Atom::text(" = "));
		clause.extend(local);

		context.joins.push(JoinSpec {
			relation: link.relation.clone(),
			correlation,
			alias: alias.clone(),
			clause,
		});
		Ok(alias)
	}

	/// A correlated sub-select aggregating one object per linked row into an
	/// array, `[]` when there are none.
	fn to_many(
		&mut self,
		relation: &Relation,
		qualifier: &Qualifier,
		link: &Link,
		entries: &[Entry],
		path: &[String],
	) -> Result<Vec<Atom>> {
		let schema = self.schema;
		let target = schema.get(&link.relation)?;
		let local = Scope::qualified(relation, qualifier).field(&link.local_field, None)?;

		self.nested += 1;
		let alias = format!("m{}", self.nested);
		let nested = Qualifier::Alias(alias.clone());
		let foreign = Scope::qualified(target, &nested).field(&link.foreign_field, None)?;

		let mut context = Context::default();
		let pairs = self.entries(&mut context, target, &nested, entries, path)?;

		let mut statement = Statement::new(Source::None);
		statement.text("SELECT COALESCE(jsonb_agg(");
		statement.extend(object(pairs)?);
		statement.text(format!("), '[]'::jsonb) FROM {} AS {alias}", quote_ident(target.name())));
		for join in context.joins {
			statement.text(" ");
			statement.extend(join.clause);
		}
		statement.text(" WHERE ");
		statement.extend(foreign);
		statement.text(" = ");
		statement.extend(local);

		Ok(vec![Atom::statement(statement)])
	}
}

enum Member {
	Value(Vec<Atom>),
	Object(IndexMap<String, Vec<Atom>>),
}

/// Builds a `jsonb` object from key/value pairs, 50 pairs per
/// `jsonb_build_object` call, merged with `||`. A dotted key nests:
/// `address.city` becomes `city` inside an `address` object.
fn object(pairs: IndexMap<String, Vec<Atom>>) -> Result<Vec<Atom>> {
	if pairs.is_empty() {
		return Ok(vec![Atom::text("'{}'::jsonb")]);
	}

	let mut members: IndexMap<String, Member> = IndexMap::with_capacity(pairs.len());
	for (key, value) in pairs {
		match key.split_once('.') {
			None => {
				if members.contains_key(&key) {
					return Err(FragmentError::KeyCollision {
						key,
					});
				}
				members.insert(key, Member::Value(value));
			}
			Some((head, rest)) => {
				match members.entry(head.to_string()).or_insert_with(|| Member::Object(IndexMap::new())) {
					Member::Object(nested) => {
						nested.insert(rest.to_string(), value);
					}
					Member::Value(_) => {
						return Err(FragmentError::KeyCollision {
							key,
						});
					}
				}
			}
		}
	}

	let mut pairs: Vec<(String, Vec<Atom>)> = Vec::with_capacity(members.len());
	for (key, member) in members {
		let value = match member {
			Member::Value(value) => value,
			Member::Object(nested) => object(nested)?,
		};
		pairs.push((key, value));
	}

	let chunked = pairs.len() > PAIRS_PER_OBJECT;
	let mut atoms = Vec::new();
	if chunked {
		atoms.push(Atom::text("("));
	}
	for (i, chunk) in pairs.chunks(PAIRS_PER_OBJECT).enumerate() {
		if i > 0 {
			atoms.push(Atom::text(" || "));
		}
		atoms.push(Atom::text("jsonb_build_object("));
		for (j, (key, value)) in chunk.iter().enumerate() {
			if j > 0 {
				atoms.push(Atom::text(", "));
			}
			atoms.push(Atom::text(format!("{}, ", quote_literal(key))));
			atoms.extend(value.iter().cloned());
		}
		atoms.push(Atom::text(")"));
	}
	if chunked {
		atoms.push(Atom::text(")"));
	}
	Ok(atoms)
}
