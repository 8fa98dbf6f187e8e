// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use mongo2pg_fragment::{Entry, Fragment, Link, Resolver, Result, Schema, compile_fragment};
use mongo2pg_type::{DataType, Relation};
use serde_json::json;

fn schema() -> Schema {
	Schema::new()
		.with_relation(
			Relation::builder("orders")
				.field("customer", DataType::Text)
				.field("status", DataType::Text)
				.build()
				.unwrap(),
		)
		.with_relation(Relation::builder("customers").field("name", DataType::Text).build().unwrap())
		.with_relation(
			Relation::builder("items")
				.field("order_id", DataType::Text)
				.field("sku", DataType::Text)
				.field("qty", DataType::Integer)
				.build()
				.unwrap(),
		)
		.with_relation(
			Relation::builder("products")
				.field("sku", DataType::Text)
				.field("title", DataType::Text)
				.build()
				.unwrap(),
		)
		.with_resolver("orders", "buyer", Resolver::ToOne(Link::new("customers", "customer", "_id")))
		.with_resolver("orders", "items", Resolver::ToMany(Link::new("items", "_id", "order_id")))
		.with_resolver("orders", "label", Resolver::Expression(json!({"$concat": ["$status", "-"]})))
		.with_resolver("items", "product", Resolver::ToOne(Link::new("products", "sku", "sku")))
		.with_resolver("items", "double", Resolver::Expression(json!({"$multiply": ["$qty", 2]})))
}

fn placeholders(sql: &str) -> Vec<usize> {
	sql.split('$')
		.skip(1)
		.filter_map(|rest| {
			let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
			digits.parse().ok()
		})
		.collect()
}

fn order_fragment() -> Fragment {
	Fragment::new(
		"OrderPage",
		"orders",
		vec![
			Entry::field("label"),
			Entry::pick(
				"items",
				vec![
					Entry::field("sku"),
					Entry::field("double"),
					Entry::pick("product", vec![Entry::field("title")]),
				],
			),
			Entry::spread("Buyer"),
		],
	)
}

fn fragments() -> Vec<Fragment> {
	vec![Fragment::new("Buyer", "orders", vec![Entry::pick("buyer", vec![Entry::field("name")])])]
}

#[test]
fn test_nested_arguments_are_contiguous() -> Result<()> {
	let schema = schema();
	let compiled = compile_fragment(&schema, &fragments(), &order_fragment())?;
	let selector = json!({"status": "open"});
	let statement = compiled.select(&schema, selector.as_object().unwrap())?;

	let output = statement.compile();
	assert_eq!(output.args, vec![json!("-"), json!(2), json!("open")]);
	assert_eq!(placeholders(&output.sql), vec![1, 2, 3]);
	assert_eq!(statement.arg_count(), output.args.len());

	let shifted = statement.compile_at(2, 0);
	assert_eq!(shifted.args, output.args);
	assert_eq!(placeholders(&shifted.sql), vec![3, 4, 5]);
	Ok(())
}

#[test]
fn test_joins_stay_in_their_query_level() -> Result<()> {
	let schema = schema();
	let compiled = compile_fragment(&schema, &fragments(), &order_fragment())?;
	let sql = compiled.select(&schema, &Default::default())?.compile().sql;

	assert_eq!(compiled.joins().len(), 1, "only the buyer join belongs to the base select");
	assert!(
		sql.contains(r#"FROM "items" AS m1 LEFT JOIN "products" AS j1 ON j1."sku" = m1."sku" WHERE m1."order_id" = "orders"."_id""#),
		"{sql}"
	);
	assert!(sql.contains(r#"LEFT JOIN "customers" AS j2 ON j2."_id" = "orders"."customer""#), "{sql}");
	assert!(sql.contains(r#"'product', CASE WHEN j1."_id" IS NOT NULL THEN jsonb_build_object('title', j1."title") ELSE NULL END"#));
	Ok(())
}

#[test]
fn test_compile_is_deterministic() -> Result<()> {
	let schema = schema();
	let first = compile_fragment(&schema, &fragments(), &order_fragment())?;
	let second = compile_fragment(&schema, &fragments(), &order_fragment())?;
	assert_eq!(first, second);
	assert_eq!(
		first.select(&schema, &Default::default())?.compile(),
		second.select(&schema, &Default::default())?.compile()
	);
	Ok(())
}
