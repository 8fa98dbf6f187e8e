// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use mongo2pg_collection::{MigrationTarget, ReadTarget, WriteTarget};
use mongo2pg_driver::{Driver, Row};
use mongo2pg_sql::{
	InsertOptions, SelectOptions, Source, Statement, UpsertTarget,
	ddl::{LOCK_ACK_TABLE, LOCK_TABLE, create_lock_tables},
	insert, quote_ident, select,
};
use mongo2pg_type::{DataType, Document, Relation, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::{MigrateError, Result};

/// A process's report of the target it has applied to a collection. Written on
/// every poll, so `observed_at` doubles as the process's heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
	pub collection: String,
	pub process_id: String,
	pub target: MigrationTarget,
	pub observed_at: DateTime<Utc>,
}

/// Durable per-collection migration targets, and the acknowledgements live
/// processes write for them.
#[async_trait]
pub trait LockStore: Send + Sync {
	/// Creates the row at `{document, document}` unless it exists, then returns
	/// the stored target.
	async fn ensure(&self, collection: &str) -> Result<MigrationTarget>;

	async fn get(&self, collection: &str) -> Result<Option<MigrationTarget>>;

	async fn set(&self, collection: &str, target: MigrationTarget) -> Result<()>;

	/// Records `acknowledgement`, replacing the process's previous one.
	async fn acknowledge(&self, acknowledgement: &Acknowledgement) -> Result<()>;

	async fn acknowledgements(&self, collection: &str) -> Result<Vec<Acknowledgement>>;
}

/// A [`LockStore`] in the `mongo2pg_lock` and `mongo2pg_lock_ack` tables.
pub struct SqlLockStore<D: Driver> {
	driver: Arc<D>,
	lock: Relation,
	ack: Relation,
}

impl<D: Driver> SqlLockStore<D> {
	pub fn new(driver: Arc<D>) -> Result<Self> {
		let lock = Relation::builder(LOCK_TABLE)
			.identity("collection_name", DataType::Text.not_null())
			.field("read_target", DataType::Text.not_null())
			.field("write_target", DataType::Text.not_null())
			.build()?;
		let ack = Relation::builder(LOCK_ACK_TABLE)
			.identity("process_id", DataType::Text.not_null())
			.field("collection_name", DataType::Text.not_null())
			.field("read_target", DataType::Text.not_null())
			.field("write_target", DataType::Text.not_null())
			.field("observed_at", DataType::Timestamp.not_null())
			.build()?;
		Ok(Self {
			driver,
			lock,
			ack,
		})
	}

	/// Creates both lock tables if they are missing.
	#[instrument(name = "migrate::lock::install", level = "debug", skip_all)]
	pub async fn install(&self) -> Result<()> {
		for statement in create_lock_tables() {
			self.driver.none(&statement.compile()).await?;
		}
		Ok(())
	}

	fn row(collection: &str, target: MigrationTarget) -> Document {
		let mut row = Document::new();
		row.insert("collection_name".to_string(), Value::from(collection));
		row.insert("read_target".to_string(), Value::from(target.read.as_str()));
		row.insert("write_target".to_string(), Value::from(target.write.as_str()));
		row
	}
}

fn text<'a>(collection: &str, row: &'a Row, column: &str) -> Result<&'a str> {
	row.get(column)
		.and_then(Value::as_str)
		.ok_or_else(|| MigrateError::malformed_lock(collection, format!("column '{column}' is missing or not text")))
}

fn parse_target(collection: &str, row: &Row) -> Result<MigrationTarget> {
	let read: ReadTarget = text(collection, row, "read_target")?.parse()?;
	let write: WriteTarget = text(collection, row, "write_target")?.parse()?;
	Ok(MigrationTarget::new(read, write))
}

fn parse_acknowledgement(collection: &str, row: &Row) -> Result<Acknowledgement> {
	let observed_at = text(collection, row, "observed_at")?;
	let observed_at = DateTime::parse_from_rfc3339(observed_at)
		.map_err(|err| MigrateError::malformed_lock(collection, format!("observed_at '{observed_at}': {err}")))?
		.with_timezone(&Utc);
	Ok(Acknowledgement {
		collection: collection.to_string(),
		process_id: text(collection, row, "process_id")?.to_string(),
		target: parse_target(collection, row)?,
		observed_at,
	})
}

#[async_trait]
impl<D: Driver + 'static> LockStore for SqlLockStore<D> {
	#[instrument(name = "migrate::lock::ensure", level = "debug", skip(self))]
	async fn ensure(&self, collection: &str) -> Result<MigrationTarget> {
		let row = Self::row(collection, MigrationTarget::DOCUMENT);
		let statement = insert(&self.lock, &[row], &InsertOptions::ignore_conflicts())?.statement;
		self.driver.none(&statement.compile()).await?;

		self.get(collection).await?.ok_or_else(|| MigrateError::malformed_lock(collection, "row missing after insert"))
	}

	async fn get(&self, collection: &str) -> Result<Option<MigrationTarget>> {
		let mut selector = Document::new();
		selector.insert("collection_name".to_string(), Value::from(collection));
		let statement = select(&self.lock, &selector, &SelectOptions::default())?;
		match self.driver.optional(&statement.compile()).await? {
			Some(row) => Ok(Some(parse_target(collection, &row)?)),
			None => Ok(None),
		}
	}

	#[instrument(name = "migrate::lock::set", level = "debug", skip(self, target), fields(%target))]
	async fn set(&self, collection: &str, target: MigrationTarget) -> Result<()> {
		let row = Self::row(collection, target);
		let statement = insert(&self.lock, &[row], &InsertOptions::upsert(UpsertTarget::default()))?.statement;
		self.driver.one(&statement.compile()).await?;
		debug!("lock updated");
		Ok(())
	}

	async fn acknowledge(&self, acknowledgement: &Acknowledgement) -> Result<()> {
		let columns = ["collection_name", "process_id", "read_target", "write_target", "observed_at"];
		let values = [
			Value::from(acknowledgement.collection.as_str()),
			Value::from(acknowledgement.process_id.as_str()),
			Value::from(acknowledgement.target.read.as_str()),
			Value::from(acknowledgement.target.write.as_str()),
			Value::from(acknowledgement.observed_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
		];

		// The conflict target is the composite primary key, which the single
		// column upsert of `insert` cannot name.
		let mut statement = Statement::new(Source::Table(self.ack.name().to_string()));
		statement.text(format!(
			"INSERT INTO {} ({}) VALUES (",
			quote_ident(self.ack.name()),
			columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
		));
		for (i, value) in values.into_iter().enumerate() {
			if i > 0 {
				statement.text(", ");
			}
			statement.arg(value);
		}
		statement.text("::timestamptz) ON CONFLICT (\"collection_name\", \"process_id\") DO UPDATE SET ");
		statement.text(
			columns[2..].iter().map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c))).collect::<Vec<_>>().join(", "),
		);

		self.driver.none(&statement.compile()).await?;
		trace!(
			collection = %acknowledgement.collection,
			process = %acknowledgement.process_id,
			target = %acknowledgement.target,
			"acknowledged"
		);
		Ok(())
	}

	async fn acknowledgements(&self, collection: &str) -> Result<Vec<Acknowledgement>> {
		let mut selector = Document::new();
		selector.insert("collection_name".to_string(), Value::from(collection));
		let statement = select(&self.ack, &selector, &SelectOptions::default())?;
		let rows = self.driver.any(&statement.compile()).await?;
		rows.iter().map(|row| parse_acknowledgement(collection, row)).collect()
	}
}
