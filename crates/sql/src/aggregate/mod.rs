// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Aggregation pipelines lowered to (possibly nested) selects.

mod group;
mod stage;
mod unit;

use mongo2pg_type::{Catalog, Relation, Value};
pub use stage::{Stage, StageKind};
use tracing::instrument;
pub use unit::Unit;

use crate::{Result, SqlError, Statement};

/// Lowers a pipeline over `relation`. Lookup targets are resolved through `catalog`.
#[instrument(name = "sql::aggregate", level = "trace", skip_all, fields(relation = relation.name(), stages = pipeline.len()))]
pub fn aggregate<C: Catalog + ?Sized>(relation: &Relation, pipeline: &[Value], catalog: &C) -> Result<Statement> {
	let mut unit = Unit::new(relation.clone());
	for stage in pipeline {
		let stage = Stage::parse(stage)?;
		if let Stage::Lookup(lookup) = &stage {
			let Some(target) = catalog.relation(&lookup.from) else {
				return Err(SqlError::UnknownRelation {
					name: lookup.from.clone(),
				});
			};
			if !target.has_field(&lookup.foreign_field) {
				return Err(SqlError::unknown_field(target.name(), lookup.foreign_field.as_str()));
			}
		}
		unit = unit.apply(stage)?;
	}
	unit.build()
}

#[cfg(test)]
mod tests {
	use mongo2pg_type::DataType;
	use serde_json::json;

	use super::*;

	fn orders() -> Relation {
		Relation::builder("orders")
			.field("customer", DataType::Text)
			.field("status", DataType::Text)
			.field("total", DataType::Numeric)
			.field("qty", DataType::Integer)
			.build()
			.unwrap()
	}

	fn customers() -> Relation {
		Relation::builder("customers").field("name", DataType::Text).build().unwrap()
	}

	fn lower(pipeline: Value) -> Result<Statement> {
		let catalog = vec![orders(), customers()];
		aggregate(&orders(), pipeline.as_array().unwrap(), &catalog)
	}

	fn sql(pipeline: Value) -> String {
		lower(pipeline).unwrap().compile().sql
	}

	#[test]
	fn test_empty_pipeline() {
		assert_eq!(sql(json!([])), r#"SELECT "orders".* FROM "orders""#);
	}

	#[test]
	fn test_flat_pipeline() {
		let compiled = lower(json!([
			{"$match": {"status": "open"}},
			{"$sort": {"total": -1}},
			{"$limit": 5}
		]))
		.unwrap()
		.compile();
		assert_eq!(
			compiled.sql,
			r#"SELECT "orders".* FROM "orders" WHERE "status" = $1 ORDER BY "total" DESC LIMIT $2"#
		);
		assert_eq!(compiled.args, vec![json!("open"), json!(5)]);
	}

	#[test]
	fn test_match_after_limit_nests() {
		let compiled = lower(json!([
			{"$match": {"status": "open"}},
			{"$sort": {"total": -1}},
			{"$limit": 5},
			{"$match": {"qty": {"$gt": 1}}}
		]))
		.unwrap()
		.compile();
		assert_eq!(
			compiled.sql,
			r#"SELECT a.* FROM (SELECT "orders".* FROM "orders" WHERE "status" = $1 ORDER BY "total" DESC LIMIT $2) AS a WHERE "qty" > $3"#
		);
		assert_eq!(compiled.args, vec![json!("open"), json!(5), json!(1)]);
	}

	#[test]
	fn test_match_after_sort_folds() {
		assert_eq!(
			sql(json!([{"$sort": {"total": 1}}, {"$match": {"status": "x"}}])),
			r#"SELECT "orders".* FROM "orders" WHERE "status" = $1 ORDER BY "total" ASC"#
		);
	}

	#[test]
	fn test_skip_after_limit_nests() {
		assert_eq!(
			sql(json!([{"$limit": 10}, {"$skip": 2}])),
			r#"SELECT a.* FROM (SELECT "orders".* FROM "orders" LIMIT $1) AS a OFFSET $2"#
		);
		assert_eq!(sql(json!([{"$skip": 2}, {"$limit": 10}])), r#"SELECT "orders".* FROM "orders" LIMIT $1 OFFSET $2"#);
	}

	#[test]
	fn test_group() {
		let compiled = lower(json!([
			{"$match": {"status": "open"}},
			{"$group": {"_id": "$customer", "n": {"$sum": 1}, "spent": {"$sum": "$total"}, "largest": {"$max": "$total"}}}
		]))
		.unwrap()
		.compile();
		assert_eq!(
			compiled.sql,
			r#"SELECT "customer" AS "_id", count(*) AS "n", sum("total") AS "spent", max("total") AS "largest" FROM (SELECT "orders".* FROM "orders" WHERE "status" = $1) AS a GROUP BY "customer""#
		);
	}

	#[test]
	fn test_stage_after_group_nests() {
		assert_eq!(
			sql(json!([
				{"$group": {"_id": "$status", "avg": {"$avg": "$total"}}},
				{"$sort": {"avg": -1}}
			])),
			r#"SELECT a.* FROM (SELECT "status" AS "_id", avg("total") AS "avg" FROM "orders" GROUP BY "status") AS a ORDER BY "avg" DESC"#
		);
	}

	#[test]
	fn test_group_by_composite_key() {
		assert_eq!(
			sql(json!([{"$group": {"_id": {"c": "$customer", "s": "$status"}, "items": {"$push": "$qty"}}}])),
			r#"SELECT jsonb_build_object('c', "customer", 's', "status") AS "_id", jsonb_agg("qty") AS "items" FROM "orders" GROUP BY "customer", "status""#
		);
	}

	#[test]
	fn test_group_first_last_and_constant_key() {
		assert_eq!(
			sql(json!([{"$group": {"_id": null, "first": {"$first": "$qty"}, "last": {"$last": "$qty"}}}])),
			r#"SELECT NULL AS "_id", (array_agg("qty"))[1] AS "first", (array_agg("qty"))[count(*)] AS "last" FROM "orders""#
		);
	}

	#[test]
	fn test_group_first_last_follow_prior_sort() {
		assert_eq!(
			sql(json!([
				{"$sort": {"total": -1}},
				{"$group": {"_id": "$customer", "top": {"$first": "$qty"}, "bottom": {"$last": "$qty"}}}
			])),
			r#"SELECT "customer" AS "_id", (array_agg("qty" ORDER BY "total" DESC))[1] AS "top", (array_agg("qty" ORDER BY "total" DESC))[count(*)] AS "bottom" FROM (SELECT "orders".* FROM "orders" ORDER BY "total" DESC) AS a GROUP BY "customer""#
		);
	}

	#[test]
	fn test_sort_projected_away_does_not_order_group() {
		assert_eq!(
			sql(json!([
				{"$sort": {"total": 1}},
				{"$project": {"qty": 1}},
				{"$group": {"_id": null, "first": {"$first": "$qty"}}}
			])),
			r#"SELECT NULL AS "_id", (array_agg("qty"))[1] AS "first" FROM (SELECT "_id", "qty" FROM "orders" ORDER BY "total" ASC) AS a"#
		);
	}

	#[test]
	fn test_count() {
		assert_eq!(
			sql(json!([{"$match": {"status": "open"}}, {"$count": "open"}])),
			r#"SELECT count(*) AS "open" FROM (SELECT "orders".* FROM "orders" WHERE "status" = $1) AS a"#
		);
	}

	#[test]
	fn test_project_then_match_nests() {
		assert_eq!(
			sql(json!([{"$project": {"total": 1, "double": {"$multiply": ["$total", 2]}}}, {"$match": {"double": {"$gt": 10}}}])),
			r#"SELECT a.* FROM (SELECT "_id", "total", ("total" * $1::numeric) AS "double" FROM "orders") AS a WHERE "double" > $2"#
		);
	}

	#[test]
	fn test_lookup() {
		let statement = lower(json!([
			{"$lookup": {"from": "customers", "localField": "customer", "foreignField": "_id", "as": "buyer"}},
			{"$match": {"status": "open"}}
		]))
		.unwrap();
		assert!(statement.is_correlated());
		assert_eq!(
			statement.compile().sql,
			r#"SELECT * FROM "orders", LATERAL (SELECT COALESCE(jsonb_agg(to_jsonb("__lookup")), '[]'::jsonb) AS "buyer" FROM "customers" AS "__lookup" WHERE "__lookup"."_id" = "orders"."customer") AS a WHERE "status" = $1"#
		);
	}

	#[test]
	fn test_lookup_after_match_correlates_with_derived_source() {
		assert_eq!(
			sql(json!([
				{"$match": {"status": "open"}},
				{"$lookup": {"from": "customers", "localField": "customer", "foreignField": "_id", "as": "buyer"}}
			])),
			r#"SELECT * FROM (SELECT "orders".* FROM "orders" WHERE "status" = $1) AS a, LATERAL (SELECT COALESCE(jsonb_agg(to_jsonb("__lookup")), '[]'::jsonb) AS "buyer" FROM "customers" AS "__lookup" WHERE "__lookup"."_id" = a."customer") AS b"#
		);
	}

	#[test]
	fn test_errors() {
		assert_eq!(
			lower(json!([{"$unwind": "$tags"}])).unwrap_err(),
			SqlError::UnimplementedStage {
				stage: "$unwind".to_string()
			}
		);
		assert_eq!(
			lower(json!([{"$lookup": {"from": "nope", "localField": "a", "foreignField": "b", "as": "c"}}])).unwrap_err(),
			SqlError::UnknownRelation {
				name: "nope".to_string()
			}
		);
		assert_eq!(
			lower(json!([{"$group": {"_id": "$status", "x": {"$stdDevPop": "$total"}}}])).unwrap_err(),
			SqlError::unsupported_operator("$stdDevPop")
		);
		assert_eq!(lower(json!([{"$match": {"nope": 1}}])).unwrap_err(), SqlError::unknown_field("orders", "nope"));
	}
}
