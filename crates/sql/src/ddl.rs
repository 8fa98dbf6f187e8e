// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Schema statements: tables and indexes for migrated relations and the
//! migration lock tables.

use mongo2pg_type::{IndexDef, Relation};

use crate::{Result, Source, SqlError, Statement, field::null_coalesced, ident::quote_ident};

pub const LOCK_TABLE: &str = "mongo2pg_lock";
pub const LOCK_ACK_TABLE: &str = "mongo2pg_lock_ack";

#[derive(Debug, Clone, Copy, Default)]
pub struct CreateTableOptions {
	/// Skip write-ahead logging until `set_logged` runs.
	pub unlogged: bool,
	pub if_not_exists: bool,
}

/// `CREATE [UNLOGGED] TABLE [IF NOT EXISTS] "relation" (...)`, identity first as
/// the primary key.
pub fn create_table(relation: &Relation, options: CreateTableOptions) -> Statement {
	let identity = relation.identity();
	let columns = relation
		.fields()
		.iter()
		.map(|(name, data_type)| {
			let mut column = format!("{} {}", quote_ident(name), data_type.column_definition());
			if name == identity {
				column.push_str(" PRIMARY KEY");
			}
			column
		})
		.collect::<Vec<_>>()
		.join(", ");

	let mut statement = Statement::new(Source::Table(relation.name().to_string()));
	statement.text(format!(
		"CREATE {}TABLE {}{} ({columns})",
		if options.unlogged {
			"UNLOGGED "
		} else {
			""
		},
		if options.if_not_exists {
			"IF NOT EXISTS "
		} else {
			""
		},
		quote_ident(relation.name())
	));
	statement
}

pub fn drop_table(name: &str) -> Statement {
	let mut statement = Statement::new(Source::Table(name.to_string()));
	statement.text(format!("DROP TABLE IF EXISTS {}", quote_ident(name)));
	statement
}

/// `ALTER TABLE "name" SET LOGGED`, restoring durability after a bulk load.
pub fn set_logged(name: &str) -> Statement {
	let mut statement = Statement::new(Source::Table(name.to_string()));
	statement.text(format!("ALTER TABLE {} SET LOGGED", quote_ident(name)));
	statement
}

/// `CREATE [UNIQUE] INDEX IF NOT EXISTS`.
///
/// Unique indexes cover `COALESCE(col, sentinel)` so that missing values
/// collide; upsert conflict targets use the same expressions.
pub fn create_index(relation: &Relation, index: &IndexDef) -> Result<Statement> {
	if index.fields.is_empty() {
		return Err(SqlError::InvalidIndex {
			message: format!("index '{}' has no fields", index.name),
		});
	}

	let mut keys = Vec::with_capacity(index.fields.len());
	for field in &index.fields {
		let Some(data_type) = relation.field(field) else {
			return Err(SqlError::unknown_field(relation.name(), field.as_str()));
		};
		keys.push(if index.unique {
			null_coalesced(field, data_type)
		} else {
			quote_ident(field)
		});
	}

	let mut statement = Statement::new(Source::Table(relation.name().to_string()));
	statement.text(format!(
		"CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
		if index.unique {
			"UNIQUE "
		} else {
			""
		},
		quote_ident(&index.name),
		quote_ident(relation.name()),
		keys.join(", ")
	));
	Ok(statement)
}

/// One statement per declared index of the relation.
pub fn create_indexes(relation: &Relation) -> Result<Vec<Statement>> {
	relation.indexes().iter().map(|index| create_index(relation, index)).collect()
}

/// The migration lock tables: one target row per collection, and one
/// acknowledgement row per collection and process.
pub fn create_lock_tables() -> Vec<Statement> {
	let mut lock = Statement::new(Source::Table(LOCK_TABLE.to_string()));
	lock.text(format!(
		"CREATE TABLE IF NOT EXISTS {} (\
		\"collection_name\" text NOT NULL PRIMARY KEY, \
		\"read_target\" text NOT NULL DEFAULT 'document' CHECK (\"read_target\" IN ('document', 'relational')), \
		\"write_target\" text NOT NULL DEFAULT 'document' CHECK (\"write_target\" IN ('document', 'relational', 'both')))",
		quote_ident(LOCK_TABLE)
	));

	let mut ack = Statement::new(Source::Table(LOCK_ACK_TABLE.to_string()));
	ack.text(format!(
		"CREATE TABLE IF NOT EXISTS {} (\
		\"collection_name\" text NOT NULL, \
		\"process_id\" text NOT NULL, \
		\"read_target\" text NOT NULL, \
		\"write_target\" text NOT NULL, \
		\"observed_at\" timestamptz NOT NULL, \
		PRIMARY KEY (\"collection_name\", \"process_id\"))",
		quote_ident(LOCK_ACK_TABLE)
	));

	vec![lock, ack]
}

#[cfg(test)]
mod tests {
	use mongo2pg_type::DataType;

	use super::*;

	fn users() -> Relation {
		Relation::builder("users")
			.field("email", DataType::Text)
			.field("age", DataType::Integer.with_default("0"))
			.field("tags", DataType::array(DataType::Text))
			.index(IndexDef::new("users_email", &["email"]).unique())
			.index(IndexDef::new("users_age", &["age"]))
			.build()
			.unwrap()
	}

	#[test]
	fn test_create_table() {
		let unlogged = CreateTableOptions {
			unlogged: true,
			if_not_exists: false,
		};
		assert_eq!(
			create_table(&users(), unlogged).compile().sql,
			r#"CREATE UNLOGGED TABLE "users" ("_id" text NOT NULL PRIMARY KEY, "email" text, "age" integer DEFAULT 0, "tags" text[])"#
		);
	}

	#[test]
	fn test_drop_and_set_logged() {
		assert_eq!(drop_table("users").compile().sql, r#"DROP TABLE IF EXISTS "users""#);
		assert_eq!(set_logged("users").compile().sql, r#"ALTER TABLE "users" SET LOGGED"#);
	}

	#[test]
	fn test_create_indexes() {
		let statements = create_indexes(&users()).unwrap();
		let sql: Vec<String> = statements.iter().map(|s| s.compile().sql).collect();
		assert_eq!(
			sql,
			vec![
				r#"CREATE UNIQUE INDEX IF NOT EXISTS "users_email" ON "users" (COALESCE("email", ''))"#.to_string(),
				r#"CREATE INDEX IF NOT EXISTS "users_age" ON "users" ("age")"#.to_string(),
			]
		);
	}

	#[test]
	fn test_lock_tables() {
		let statements = create_lock_tables();
		assert_eq!(statements.len(), 2);
		assert!(statements[0].compile().sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "mongo2pg_lock" ("#));
		assert!(statements[1].compile().sql.contains(r#"PRIMARY KEY ("collection_name", "process_id")"#));
	}
}
