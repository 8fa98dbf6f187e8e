// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use chrono::{DateTime, SecondsFormat, Utc};
use mongo2pg_collection::{Collection, FindOptions};
use mongo2pg_driver::Executor;
use mongo2pg_sql::{InsertOptions, insert};
use mongo2pg_type::{Document, Relation, Value};
use serde_json::json;
use tracing::{debug, instrument, trace};

use crate::Result;

/// Which documents a copy pass reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyFilter {
	All,
	/// Documents whose creation-time field is at or after the instant. The
	/// field holds an RFC 3339 UTC timestamp. Relations without a creation-time
	/// field are copied whole.
	CreatedSince(DateTime<Utc>),
}

/// Renders an instant the way creation-time fields store it, so that string
/// comparison orders instants.
pub fn created_at(instant: DateTime<Utc>) -> String {
	instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn condition(field: &str, operator: &str, value: Value) -> Value {
	let mut comparison = Document::new();
	comparison.insert(operator.to_string(), value);
	let mut selector = Document::new();
	selector.insert(field.to_string(), Value::Object(comparison));
	Value::Object(selector)
}

/// Copies documents from `source` into the relation's table in identity order,
/// `batch_size` at a time. Rows whose identity already exists are skipped, so a
/// pass may overlap an earlier one. Fields the relation does not declare are
/// dropped. Returns the number of rows inserted.
#[instrument(name = "migrate::copy", level = "debug", skip_all, fields(collection = %relation.name(), ?filter))]
pub async fn copy_documents<E: Executor + ?Sized>(
	source: &dyn Collection,
	executor: &E,
	relation: &Relation,
	filter: CopyFilter,
	batch_size: u64,
) -> Result<u64> {
	let identity = relation.identity();
	let batch_size = batch_size.max(1);
	let created = match filter {
		CopyFilter::All => None,
		CopyFilter::CreatedSince(since) => match relation.created_field() {
			Some(field) => Some((field, created_at(since))),
			None => {
				debug!("no creation-time field, copying everything");
				None
			}
		},
	};

	let mut sort = Document::new();
	sort.insert(identity.to_string(), json!(1));
	let options = FindOptions::default().with_sort(sort).with_limit(batch_size);

	let mut after: Option<Value> = None;
	let mut copied = 0u64;
	loop {
		let mut clauses = Vec::new();
		if let Some((field, since)) = &created {
			clauses.push(condition(field, "$gte", Value::from(since.as_str())));
		}
		if let Some(last) = &after {
			clauses.push(condition(identity, "$gt", last.clone()));
		}
		let mut selector = Document::new();
		if !clauses.is_empty() {
			selector.insert("$and".to_string(), Value::Array(clauses));
		}

		let batch = source.find(&selector, &options).await?;
		if batch.is_empty() {
			break;
		}

		let rows: Vec<Document> = batch
			.iter()
			.map(|document| {
				document.iter()
					.filter(|(name, _)| relation.has_field(name))
					.map(|(name, value)| (name.clone(), value.clone()))
					.collect()
			})
			.collect();
		let statement = insert(relation, &rows, &InsertOptions::ignore_conflicts())?.statement;
		let inserted = executor.none(&statement.compile()).await?;
		copied += inserted;
		trace!(read = batch.len(), inserted, "copied batch");

		after = batch.last().and_then(|document| document.get(identity)).filter(|id| !id.is_null()).cloned();
		if (batch.len() as u64) < batch_size || after.is_none() {
			break;
		}
	}

	debug!(copied, "copy finished");
	Ok(copied)
}
