// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{cmp::Ordering, sync::Arc};

use async_trait::async_trait;
use indexmap::IndexMap;
use mongo2pg_driver::{Compiled, Driver, DriverError, Executor, Result, Row, Transaction};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use crate::{
	driver::statement::{CreateTable, InsertInto, OnConflict, Operand, Parsed, Projection, Returned, SelectFrom, parse},
	util::compare_values,
};

/// A table held by the [`MemoryDriver`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
	pub columns: Vec<String>,
	pub primary_key: Vec<String>,
	pub logged: bool,
	pub rows: Vec<Row>,
}

type Tables = IndexMap<String, Table>;

type Predicate = Box<dyn Fn(&Compiled) -> bool + Send + Sync>;

enum Reply {
	Fail(String),
	Rows(Vec<Row>),
}

struct Rule {
	matches: Predicate,
	reply: Reply,
	remaining: Option<usize>,
}

#[derive(Default)]
struct Inner {
	tables: Mutex<Tables>,
	log: Mutex<Vec<Compiled>>,
	rules: Mutex<Vec<Rule>>,
}

struct Outcome {
	rows: Vec<Row>,
	affected: u64,
	mutated: bool,
}

/// A [`Driver`] that keeps tables in memory.
///
/// It executes the statements the lock store, the bulk copy and simple
/// collection calls compile to; anything else fails with a syntax error unless
/// a rule registered with [`respond_when`](MemoryDriver::respond_when) answers
/// it. Every statement is logged, transactional ones included.
#[derive(Clone, Default)]
pub struct MemoryDriver {
	inner: Arc<Inner>,
}

impl MemoryDriver {
	pub fn new() -> Self {
		Self::default()
	}

	/// Fails every matching statement with `message`.
	pub fn fail_when(&self, matches: impl Fn(&Compiled) -> bool + Send + Sync + 'static, message: impl Into<String>) {
		self.rule(Box::new(matches), Reply::Fail(message.into()), None);
	}

	/// Fails the next matching statement with `message`.
	pub fn fail_once(&self, matches: impl Fn(&Compiled) -> bool + Send + Sync + 'static, message: impl Into<String>) {
		self.rule(Box::new(matches), Reply::Fail(message.into()), Some(1));
	}

	/// Answers every matching statement with `rows` instead of executing it.
	pub fn respond_when(&self, matches: impl Fn(&Compiled) -> bool + Send + Sync + 'static, rows: Vec<Row>) {
		self.rule(Box::new(matches), Reply::Rows(rows), None);
	}

	fn rule(&self, matches: Predicate, reply: Reply, remaining: Option<usize>) {
		self.inner.rules.lock().push(Rule {
			matches,
			reply,
			remaining,
		});
	}

	/// Every statement received so far, in order.
	pub fn statements(&self) -> Vec<Compiled> {
		self.inner.log.lock().clone()
	}

	pub fn table(&self, name: &str) -> Option<Table> {
		self.inner.tables.lock().get(name).cloned()
	}

	/// The committed rows of `name`; empty when the table does not exist.
	pub fn rows(&self, name: &str) -> Vec<Row> {
		self.table(name).map(|table| table.rows).unwrap_or_default()
	}

	/// Logs the statement and applies the first matching rule, if any.
	fn intercept(&self, query: &Compiled) -> Result<Option<Outcome>> {
		trace!(sql = %query.sql, args = ?query.args, "memory driver");
		self.inner.log.lock().push(query.clone());

		let mut rules = self.inner.rules.lock();
		let Some(position) = rules.iter().position(|rule| (rule.matches)(query)) else {
			return Ok(None);
		};
		let rule = &mut rules[position];
		let outcome = match &rule.reply {
			Reply::Fail(message) => Err(DriverError::execution(query, message.clone())),
			Reply::Rows(rows) => Ok(Some(Outcome {
				rows: rows.clone(),
				affected: rows.len() as u64,
				mutated: false,
			})),
		};
		if let Some(remaining) = rule.remaining.as_mut() {
			*remaining -= 1;
			if *remaining == 0 {
				rules.remove(position);
			}
		}
		outcome
	}

	fn run(&self, query: &Compiled) -> Result<Outcome> {
		if let Some(outcome) = self.intercept(query)? {
			return Ok(outcome);
		}
		let mut tables = self.inner.tables.lock();
		execute(&mut tables, query).map_err(|message| DriverError::execution(query, message))
	}
}

#[async_trait]
impl Executor for MemoryDriver {
	async fn any(&self, query: &Compiled) -> Result<Vec<Row>> {
		Ok(self.run(query)?.rows)
	}

	async fn none(&self, query: &Compiled) -> Result<u64> {
		Ok(self.run(query)?.affected)
	}
}

#[async_trait]
impl Driver for MemoryDriver {
	async fn begin(&self) -> Result<Box<dyn Transaction>> {
		let snapshot = self.inner.tables.lock().clone();
		Ok(Box::new(MemoryTransaction {
			driver: self.clone(),
			tables: Mutex::new(snapshot),
			writes: Mutex::new(Vec::new()),
		}))
	}
}

/// Works on a snapshot of the driver's tables. Commit replays the
/// transaction's writes onto the current tables, so rows other writers added
/// in the meantime are kept.
pub struct MemoryTransaction {
	driver: MemoryDriver,
	tables: Mutex<Tables>,
	writes: Mutex<Vec<Compiled>>,
}

impl MemoryTransaction {
	fn run(&self, query: &Compiled) -> Result<Outcome> {
		if let Some(outcome) = self.driver.intercept(query)? {
			return Ok(outcome);
		}
		let outcome = {
			let mut tables = self.tables.lock();
			execute(&mut tables, query).map_err(|message| DriverError::execution(query, message))?
		};
		if outcome.mutated {
			self.writes.lock().push(query.clone());
		}
		Ok(outcome)
	}
}

#[async_trait]
impl Executor for MemoryTransaction {
	async fn any(&self, query: &Compiled) -> Result<Vec<Row>> {
		Ok(self.run(query)?.rows)
	}

	async fn none(&self, query: &Compiled) -> Result<u64> {
		Ok(self.run(query)?.affected)
	}
}

#[async_trait]
impl Transaction for MemoryTransaction {
	async fn commit(self: Box<Self>) -> Result<()> {
		let this = *self;
		let writes = this.writes.into_inner();
		let mut live = this.driver.inner.tables.lock();
		let mut tables = live.clone();
		for query in &writes {
			execute(&mut tables, query).map_err(|message| DriverError::Transaction {
				action: "commit".to_string(),
				message,
			})?;
		}
		*live = tables;
		Ok(())
	}

	async fn rollback(self: Box<Self>) -> Result<()> {
		Ok(())
	}
}

fn execute(tables: &mut Tables, query: &Compiled) -> std::result::Result<Outcome, String> {
	let parsed = parse(&query.sql).map_err(|err| format!("syntax error: {err}"))?;
	let done = |affected: u64| Outcome {
		rows: vec![],
		affected,
		mutated: true,
	};

	match parsed {
		Parsed::CreateTable(create) => create_table(tables, create).map(|()| done(0)),
		Parsed::DropTable {
			name,
		} => {
			tables.shift_remove(&name);
			Ok(done(0))
		}
		Parsed::SetLogged {
			name,
		} => {
			table_mut(tables, &name)?.logged = true;
			Ok(done(0))
		}
		Parsed::CreateIndex {
			table,
		} => table_mut(tables, &table).map(|_| done(0)),
		Parsed::Insert(insert) => insert_into(table_mut(tables, &insert.table)?, insert, &query.args),
		Parsed::Select(select) => {
			let table = tables.get(&select.table).ok_or_else(|| missing(&select.table))?;
			select_from(table, select, &query.args)
		}
	}
}

fn missing(name: &str) -> String {
	format!("relation \"{name}\" does not exist")
}

fn table_mut<'a>(tables: &'a mut Tables, name: &str) -> std::result::Result<&'a mut Table, String> {
	tables.get_mut(name).ok_or_else(|| missing(name))
}

fn arg(args: &[Value], n: usize) -> std::result::Result<Value, String> {
	args.get(n - 1).cloned().ok_or_else(|| format!("there is no parameter ${n}"))
}

fn create_table(tables: &mut Tables, create: CreateTable) -> std::result::Result<(), String> {
	if tables.contains_key(&create.name) {
		if create.if_not_exists {
			return Ok(());
		}
		return Err(format!("relation \"{}\" already exists", create.name));
	}
	tables.insert(
		create.name,
		Table {
			columns: create.columns,
			primary_key: create.primary_key,
			logged: !create.unlogged,
			rows: vec![],
		},
	);
	Ok(())
}

fn insert_into(table: &mut Table, insert: InsertInto, args: &[Value]) -> std::result::Result<Outcome, String> {
	for column in &insert.columns {
		if !table.columns.contains(column) {
			return Err(format!("column \"{column}\" of relation \"{}\" does not exist", insert.table));
		}
	}

	let mut returned = Vec::new();
	let mut affected = 0u64;
	for operands in &insert.rows {
		let mut row: Row = table.columns.iter().map(|column| (column.clone(), Value::Null)).collect();
		for (column, operand) in insert.columns.iter().zip(operands) {
			let value = match operand {
				Operand::Arg(n) => arg(args, *n)?,
				Operand::Null => Value::Null,
			};
			row.insert(column.clone(), value);
		}

		let existing = if table.primary_key.is_empty() {
			None
		} else {
			table.rows.iter().position(|candidate| {
				table.primary_key.iter().all(|column| {
					let value = row.get(column).unwrap_or(&Value::Null);
					!value.is_null() && candidate.get(column) == Some(value)
				})
			})
		};

		let (stored, inserted) = match (existing, &insert.on_conflict) {
			(None, _) => {
				table.rows.push(row);
				(table.rows.len() - 1, true)
			}
			(Some(_), OnConflict::Raise) => {
				return Err(format!(
					"duplicate key value violates unique constraint \"{}_pkey\"",
					insert.table
				));
			}
			(Some(_), OnConflict::Ignore) => continue,
			(Some(position), OnConflict::Overwrite(columns)) => {
				for column in columns {
					let value = row.get(column).cloned().unwrap_or(Value::Null);
					table.rows[position].insert(column.clone(), value);
				}
				(position, false)
			}
		};
		affected += 1;

		if !insert.returning.is_empty() {
			let stored = &table.rows[stored];
			returned.push(
				insert.returning
					.iter()
					.map(|item| match item {
						Returned::Column(column) => {
							(column.clone(), stored.get(column).cloned().unwrap_or(Value::Null))
						}
						Returned::Inserted(name) => (name.clone(), Value::Bool(inserted)),
					})
					.collect(),
			);
		}
	}

	Ok(Outcome {
		rows: returned,
		affected,
		mutated: true,
	})
}

fn select_from(table: &Table, select: SelectFrom, args: &[Value]) -> std::result::Result<Outcome, String> {
	let referenced = select.filter.iter().map(|(column, _)| column).chain(select.order.iter().map(|(column, _)| column));
	for column in referenced {
		if !table.columns.contains(column) {
			return Err(format!("column \"{column}\" does not exist"));
		}
	}

	let mut filter = Vec::with_capacity(select.filter.len());
	for (column, n) in &select.filter {
		filter.push((column, arg(args, *n)?));
	}
	let mut rows: Vec<&Row> = table
		.rows
		.iter()
		.filter(|row| filter.iter().all(|(column, value)| row.get(*column) == Some(value)))
		.collect();

	rows.sort_by(|a, b| {
		for (column, descending) in &select.order {
			let ordering = compare_values(a.get(column), b.get(column));
			let ordering = if *descending {
				ordering.reverse()
			} else {
				ordering
			};
			if ordering != Ordering::Equal {
				return ordering;
			}
		}
		Ordering::Equal
	});

	let offset = match select.offset {
		Some(n) => arg(args, n)?.as_u64().ok_or("OFFSET must be a non-negative integer")? as usize,
		None => 0,
	};
	let limit = match select.limit {
		Some(n) => arg(args, n)?.as_u64().ok_or("LIMIT must be a non-negative integer")? as usize,
		None => usize::MAX,
	};
	let rows: Vec<Row> = rows.into_iter().skip(offset).take(limit).cloned().collect();

	let rows = match select.projection {
		Projection::All => rows,
		Projection::Count(name) => {
			let mut row = Row::new();
			row.insert(name, Value::from(rows.len() as u64));
			vec![row]
		}
	};
	Ok(Outcome {
		affected: rows.len() as u64,
		rows,
		mutated: false,
	})
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn query(sql: &str, args: Vec<Value>) -> Compiled {
		Compiled {
			sql: sql.to_string(),
			args,
		}
	}

	async fn users() -> MemoryDriver {
		let driver = MemoryDriver::new();
		driver.none(&query(r#"CREATE TABLE "users" ("_id" text NOT NULL PRIMARY KEY, "name" text)"#, vec![]))
			.await
			.unwrap();
		driver
	}

	#[tokio::test]
	async fn test_insert_and_select() {
		let driver = users().await;
		let inserted = driver
			.none(&query(
				r#"INSERT INTO "users" ("_id", "name") VALUES ($1, $2), ($3, NULL)"#,
				vec![json!("1"), json!("a"), json!("2")],
			))
			.await
			.unwrap();
		assert_eq!(inserted, 2);

		let rows = driver
			.any(&query(r#"SELECT "users".* FROM "users" WHERE "_id" = $1"#, vec![json!("2")]))
			.await
			.unwrap();
		assert_eq!(rows, vec![json!({"_id": "2", "name": null}).as_object().unwrap().clone()]);

		let count = driver.one(&query(r#"SELECT count(*) AS "count" FROM "users""#, vec![])).await.unwrap();
		assert_eq!(count.get("count"), Some(&json!(2)));
	}

	#[tokio::test]
	async fn test_conflicts() {
		let driver = users().await;
		let insert = r#"INSERT INTO "users" ("_id", "name") VALUES ($1, $2)"#;
		driver.none(&query(insert, vec![json!("1"), json!("a")])).await.unwrap();

		let err = driver.none(&query(insert, vec![json!("1"), json!("b")])).await.unwrap_err();
		assert!(matches!(err, DriverError::Execution { ref message, .. } if message.contains("duplicate key")));

		let ignored = driver
			.none(&query(&format!("{insert} ON CONFLICT DO NOTHING"), vec![json!("1"), json!("b")]))
			.await
			.unwrap();
		assert_eq!(ignored, 0);

		let upserted = driver
			.one(&query(
				&format!(
					r#"{insert} ON CONFLICT ("_id") DO UPDATE SET "name" = EXCLUDED."name" RETURNING "_id", (xmax = 0) AS "inserted""#
				),
				vec![json!("1"), json!("c")],
			))
			.await
			.unwrap();
		assert_eq!(Value::Object(upserted), json!({"_id": "1", "inserted": false}));
		assert_eq!(driver.rows("users")[0].get("name"), Some(&json!("c")));
	}

	#[tokio::test]
	async fn test_transaction_commit_keeps_concurrent_writes() {
		let driver = users().await;
		let insert = r#"INSERT INTO "users" ("_id") VALUES ($1) ON CONFLICT DO NOTHING"#;

		let transaction = driver.begin().await.unwrap();
		transaction.none(&query(insert, vec![json!("tx")])).await.unwrap();
		driver.none(&query(insert, vec![json!("outside")])).await.unwrap();
		assert_eq!(driver.rows("users").len(), 1);

		transaction.commit().await.unwrap();
		let ids: Vec<Value> = driver.rows("users").iter().map(|row| row["_id"].clone()).collect();
		assert_eq!(ids, vec![json!("outside"), json!("tx")]);
	}

	#[tokio::test]
	async fn test_transaction_rollback() {
		let driver = MemoryDriver::new();
		let transaction = driver.begin().await.unwrap();
		transaction.none(&query(r#"CREATE UNLOGGED TABLE "t" ("_id" text PRIMARY KEY)"#, vec![])).await.unwrap();
		transaction.rollback().await.unwrap();
		assert!(driver.table("t").is_none());
	}

	#[tokio::test]
	async fn test_rules() {
		let driver = users().await;
		driver.fail_once(|q| q.sql.starts_with("INSERT"), "disk full");
		driver.respond_when(|q| q.sql.starts_with("UPDATE"), vec![json!({"n": 1}).as_object().unwrap().clone()]);

		let insert = query(r#"INSERT INTO "users" ("_id") VALUES ($1)"#, vec![json!("1")]);
		assert!(driver.none(&insert).await.is_err());
		assert_eq!(driver.none(&insert).await.unwrap(), 1);

		let update = query(r#"UPDATE "users" SET "name" = $1"#, vec![json!("x")]);
		assert_eq!(driver.none(&update).await.unwrap(), 1);
		assert_eq!(driver.statements().len(), 4);
	}

	#[tokio::test]
	async fn test_unknown_table() {
		let driver = MemoryDriver::new();
		let err = driver.any(&query(r#"SELECT "t".* FROM "t""#, vec![])).await.unwrap_err();
		assert!(err.to_string().contains(r#"relation "t" does not exist"#));
	}
}
