// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::cmp::Ordering;

use async_trait::async_trait;
use mongo2pg_collection::{
	Backend, Collection, CollectionError, DeleteResult, FindOptions, InsertManyResult, InsertOneResult, Operation,
	Result, UpdateOptions, UpdateResult,
};
use mongo2pg_type::{Document, IndexDef, Value, is_operator_key};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::util::compare_values;

type FindHook = Box<dyn FnOnce(&mut Vec<Document>) + Send>;

/// The document backend of a dual collection, held in memory.
///
/// Selectors support field equality, dotted paths, `$and`, `$or`, `$nor`,
/// `$not` and the comparison operators; modifiers support `$set`, `$unset`,
/// `$inc` and whole-document replacement.
pub struct MemoryDocumentCollection {
	name: String,
	state: Mutex<State>,
}

#[derive(Default)]
struct State {
	documents: Vec<Document>,
	indexes: Vec<IndexDef>,
	failures: Vec<(Operation, String)>,
	finds: usize,
	after_find: Vec<(usize, FindHook)>,
}

fn failed(message: impl Into<String>) -> CollectionError {
	CollectionError::backend(Backend::Document, message)
}

impl MemoryDocumentCollection {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			state: Mutex::new(State::default()),
		}
	}

	pub fn with_documents(self, documents: impl IntoIterator<Item = Document>) -> Self {
		self.state.lock().documents.extend(documents);
		self
	}

	/// A snapshot of the stored documents in insertion order.
	pub fn documents(&self) -> Vec<Document> {
		self.state.lock().documents.clone()
	}

	pub fn get(&self, id: &Value) -> Option<Document> {
		self.state.lock().documents.iter().find(|document| document.get("_id") == Some(id)).cloned()
	}

	pub fn indexes(&self) -> Vec<IndexDef> {
		self.state.lock().indexes.clone()
	}

	/// Fails the next call of `operation` with `message`.
	pub fn fail_next(&self, operation: Operation, message: impl Into<String>) {
		self.state.lock().failures.push((operation, message.into()));
	}

	/// Runs `hook` on the stored documents right after the `call`-th `find`
	/// (1-based) has read its result, as a concurrent writer would.
	pub fn after_find(&self, call: usize, hook: impl FnOnce(&mut Vec<Document>) + Send + 'static) {
		self.state.lock().after_find.push((call, Box::new(hook)));
	}

	/// Number of `find` calls so far.
	pub fn finds(&self) -> usize {
		self.state.lock().finds
	}

	fn check(state: &mut State, operation: Operation) -> Result<()> {
		match state.failures.iter().position(|(failing, _)| *failing == operation) {
			Some(position) => Err(failed(state.failures.remove(position).1)),
			None => Ok(()),
		}
	}

	fn query(documents: &[Document], selector: &Document, options: &FindOptions) -> Result<Vec<Document>> {
		let mut found = Vec::new();
		for document in documents {
			if matches(document, selector).map_err(failed)? {
				found.push(document);
			}
		}
		if let Some(order) = &options.sort {
			sort(&mut found, order);
		}
		let skip = options.skip.unwrap_or(0) as usize;
		let limit = options.limit.map_or(usize::MAX, |limit| limit as usize);
		found.into_iter()
			.skip(skip)
			.take(limit)
			.map(|document| match &options.projection {
				Some(projection) => project(document, projection),
				None => Ok(document.clone()),
			})
			.collect::<std::result::Result<_, _>>()
			.map_err(failed)
	}

	fn assign_identity(documents: &[Document], document: &Document) -> Result<Document> {
		let mut document = document.clone();
		if document.get("_id").is_none_or(Value::is_null) {
			document.insert("_id".to_string(), Value::String(Uuid::now_v7().simple().to_string()));
		}
		let id = document.get("_id").cloned().unwrap_or(Value::Null);
		if documents.iter().any(|existing| existing.get("_id") == Some(&id)) {
			return Err(failed(format!("duplicate key: _id {id}")));
		}
		Ok(document)
	}

	fn update(
		&self,
		operation: Operation,
		selector: &Document,
		modifier: &Document,
		options: &UpdateOptions,
	) -> Result<UpdateResult> {
		let mut state = self.state.lock();
		Self::check(&mut state, operation)?;

		let mut result = UpdateResult::default();
		for document in state.documents.iter_mut() {
			if !matches(document, selector).map_err(failed)? {
				continue;
			}
			let before = document.clone();
			apply_modifier(document, modifier).map_err(failed)?;
			result.matched += 1;
			if *document != before {
				result.modified += 1;
			}
			if operation == Operation::UpdateOne {
				break;
			}
		}

		if result.matched == 0 && options.upsert {
			let mut document: Document = selector
				.iter()
				.filter(|(key, value)| !is_operator_key(key) && !matches!(value, Value::Object(_)))
				.map(|(key, value)| (key.clone(), value.clone()))
				.collect();
			apply_modifier(&mut document, modifier).map_err(failed)?;
			if let Some(id) = &options.upsert_id {
				document.entry("_id".to_string()).or_insert_with(|| id.clone());
			}
			let document = Self::assign_identity(&state.documents, &document)?;
			result.upserted_id = document.get("_id").cloned();
			state.documents.push(document);
		}
		Ok(result)
	}

	fn delete(&self, operation: Operation, selector: &Document) -> Result<DeleteResult> {
		let mut state = self.state.lock();
		Self::check(&mut state, operation)?;

		let mut deleted = 0u64;
		let mut kept = Vec::with_capacity(state.documents.len());
		for document in std::mem::take(&mut state.documents) {
			let single_done = operation == Operation::DeleteOne && deleted == 1;
			if !single_done && matches(&document, selector).map_err(failed)? {
				deleted += 1;
			} else {
				kept.push(document);
			}
		}
		state.documents = kept;
		Ok(DeleteResult {
			deleted,
		})
	}
}

#[async_trait]
impl Collection for MemoryDocumentCollection {
	fn name(&self) -> &str {
		&self.name
	}

	async fn find(&self, selector: &Document, options: &FindOptions) -> Result<Vec<Document>> {
		let mut state = self.state.lock();
		Self::check(&mut state, Operation::Find)?;
		let found = Self::query(&state.documents, selector, options)?;

		state.finds += 1;
		let call = state.finds;
		if let Some(position) = state.after_find.iter().position(|(at, _)| *at == call) {
			let (_, hook) = state.after_find.remove(position);
			hook(&mut state.documents);
		}
		Ok(found)
	}

	async fn find_one(&self, selector: &Document, options: &FindOptions) -> Result<Option<Document>> {
		let mut state = self.state.lock();
		Self::check(&mut state, Operation::FindOne)?;
		let options = options.clone().with_limit(1);
		Ok(Self::query(&state.documents, selector, &options)?.into_iter().next())
	}

	async fn count(&self, selector: &Document) -> Result<u64> {
		let mut state = self.state.lock();
		Self::check(&mut state, Operation::Count)?;
		Ok(Self::query(&state.documents, selector, &FindOptions::default())?.len() as u64)
	}

	async fn aggregate(&self, pipeline: &[Value]) -> Result<Vec<Document>> {
		let mut state = self.state.lock();
		Self::check(&mut state, Operation::Aggregate)?;

		let mut documents = state.documents.clone();
		for stage in pipeline {
			let Some((name, argument)) = stage.as_object().and_then(|stage| stage.iter().next()) else {
				return Err(failed(format!("malformed stage {stage}")));
			};
			let options = match (name.as_str(), argument) {
				("$match", Value::Object(selector)) => {
					documents = Self::query(&documents, selector, &FindOptions::default())?;
					continue;
				}
				("$sort", Value::Object(order)) => FindOptions::default().with_sort(order.clone()),
				("$skip", Value::Number(n)) => FindOptions::default().with_skip(n.as_u64().unwrap_or(0)),
				("$limit", Value::Number(n)) => FindOptions::default().with_limit(n.as_u64().unwrap_or(0)),
				("$project", Value::Object(projection)) => FindOptions::default().with_projection(projection.clone()),
				("$count", Value::String(field)) => {
					let mut counted = Document::new();
					counted.insert(field.clone(), Value::from(documents.len() as u64));
					documents = vec![counted];
					continue;
				}
				_ => return Err(failed(format!("stage {name} is not supported in memory"))),
			};
			documents = Self::query(&documents, &Document::new(), &options)?;
		}
		Ok(documents)
	}

	async fn insert_one(&self, document: &Document) -> Result<InsertOneResult> {
		let mut state = self.state.lock();
		Self::check(&mut state, Operation::InsertOne)?;
		let document = Self::assign_identity(&state.documents, document)?;
		let inserted_id = document.get("_id").cloned().unwrap_or(Value::Null);
		state.documents.push(document);
		Ok(InsertOneResult {
			inserted_id,
		})
	}

	async fn insert_many(&self, documents: &[Document]) -> Result<InsertManyResult> {
		let mut state = self.state.lock();
		Self::check(&mut state, Operation::InsertMany)?;

		let mut staged: Vec<Document> = Vec::with_capacity(documents.len());
		for document in documents {
			let all: Vec<Document> = state.documents.iter().chain(staged.iter()).cloned().collect();
			staged.push(Self::assign_identity(&all, document)?);
		}
		let inserted_ids = staged.iter().map(|document| document.get("_id").cloned().unwrap_or(Value::Null)).collect();
		state.documents.extend(staged);
		Ok(InsertManyResult {
			inserted_ids,
		})
	}

	async fn update_one(
		&self,
		selector: &Document,
		modifier: &Document,
		options: &UpdateOptions,
	) -> Result<UpdateResult> {
		self.update(Operation::UpdateOne, selector, modifier, options)
	}

	async fn update_many(&self, selector: &Document, modifier: &Document) -> Result<UpdateResult> {
		self.update(Operation::UpdateMany, selector, modifier, &UpdateOptions::default())
	}

	async fn delete_one(&self, selector: &Document) -> Result<DeleteResult> {
		self.delete(Operation::DeleteOne, selector)
	}

	async fn delete_many(&self, selector: &Document) -> Result<DeleteResult> {
		self.delete(Operation::DeleteMany, selector)
	}

	async fn ensure_index(&self, index: &IndexDef) -> Result<()> {
		let mut state = self.state.lock();
		Self::check(&mut state, Operation::EnsureIndex)?;
		if !state.indexes.iter().any(|existing| existing.name == index.name) {
			state.indexes.push(index.clone());
		}
		Ok(())
	}
}

/// Resolves a dotted path; numeric segments index into arrays.
fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
	let mut segments = path.split('.');
	let mut current = document.get(segments.next()?)?;
	for segment in segments {
		current = match current {
			Value::Object(object) => object.get(segment)?,
			Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
			_ => return None,
		};
	}
	Some(current)
}

fn operands(value: &Value) -> std::result::Result<Vec<&Document>, String> {
	match value {
		Value::Object(selector) => Ok(vec![selector]),
		Value::Array(items) => items
			.iter()
			.map(|item| item.as_object().ok_or_else(|| format!("logical operand {item} is not a selector")))
			.collect(),
		other => Err(format!("logical operand {other} is not a selector")),
	}
}

/// Whether `document` satisfies `selector`.
pub fn matches(document: &Document, selector: &Document) -> std::result::Result<bool, String> {
	for (key, condition) in selector {
		let matched = match key.as_str() {
			"$and" => {
				let mut all = true;
				for operand in operands(condition)? {
					all &= matches(document, operand)?;
				}
				all
			}
			"$or" | "$nor" => {
				let mut any = false;
				for operand in operands(condition)? {
					any |= matches(document, operand)?;
				}
				if key == "$or" {
					any
				} else {
					!any
				}
			}
			"$comment" => true,
			_ if is_operator_key(key) => return Err(format!("unsupported top-level operator {key}")),
			_ => matches_field(lookup(document, key), condition)?,
		};
		if !matched {
			return Ok(false);
		}
	}
	Ok(true)
}

fn equals(value: Option<&Value>, expected: &Value) -> bool {
	match (value, expected) {
		(None, Value::Null) => true,
		(Some(Value::Array(items)), expected) if !expected.is_array() => items.contains(expected),
		(Some(value), expected) => value == expected,
		(None, _) => false,
	}
}

/// Ordered comparison; values of different kinds never compare.
fn compare(value: Option<&Value>, operand: &Value) -> Option<Ordering> {
	let comparable = matches!(
		(value?, operand),
		(Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) | (Value::Bool(_), Value::Bool(_))
	);
	comparable.then(|| compare_values(value, Some(operand)))
}

fn matches_field(value: Option<&Value>, condition: &Value) -> std::result::Result<bool, String> {
	let Value::Object(operators) = condition else {
		return Ok(equals(value, condition));
	};
	if !operators.keys().any(|key| is_operator_key(key)) {
		return Ok(equals(value, condition));
	}

	for (operator, operand) in operators {
		let matched = match operator.as_str() {
			"$eq" => equals(value, operand),
			"$ne" => !equals(value, operand),
			"$gt" => compare(value, operand) == Some(Ordering::Greater),
			"$gte" => matches!(compare(value, operand), Some(Ordering::Greater | Ordering::Equal)),
			"$lt" => compare(value, operand) == Some(Ordering::Less),
			"$lte" => matches!(compare(value, operand), Some(Ordering::Less | Ordering::Equal)),
			"$in" | "$nin" => {
				let Value::Array(candidates) = operand else {
					return Err(format!("{operator} needs an array"));
				};
				let found = candidates.iter().any(|candidate| equals(value, candidate));
				if operator == "$in" {
					found
				} else {
					!found
				}
			}
			"$exists" => value.is_some() == operand.as_bool().unwrap_or(true),
			"$not" => !matches_field(value, operand)?,
			other => return Err(format!("unsupported operator {other}")),
		};
		if !matched {
			return Ok(false);
		}
	}
	Ok(true)
}

fn sort(documents: &mut [&Document], order: &Document) {
	documents.sort_by(|a, b| {
		for (field, direction) in order {
			let ordering = compare_values(lookup(a, field), lookup(b, field));
			let ordering = if direction.as_i64() == Some(-1) {
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
}

fn truthy(value: &Value) -> bool {
	match value {
		Value::Bool(flag) => *flag,
		Value::Number(n) => n.as_f64() != Some(0.0),
		_ => true,
	}
}

/// Applies an inclusion or exclusion projection over top-level fields.
fn project(document: &Document, projection: &Document) -> std::result::Result<Document, String> {
	let including = projection.iter().any(|(field, flag)| field != "_id" && truthy(flag));
	let excluding = projection.iter().any(|(field, flag)| field != "_id" && !truthy(flag));
	if including && excluding {
		return Err("projection mixes inclusion and exclusion".to_string());
	}

	let keep_id = projection.get("_id").is_none_or(truthy);
	Ok(document
		.iter()
		.filter(|(field, _)| {
			if *field == "_id" {
				keep_id
			} else if including {
				projection.get(*field).is_some_and(truthy)
			} else {
				!projection.contains_key(*field)
			}
		})
		.map(|(field, value)| (field.clone(), value.clone()))
		.collect())
}

fn set_path(document: &mut Document, path: &str, value: Value) -> std::result::Result<(), String> {
	let mut segments: Vec<&str> = path.split('.').collect();
	let last = segments.pop().unwrap_or(path);
	let mut current = document;
	for segment in segments {
		let entry = current.entry(segment.to_string()).or_insert_with(|| Value::Object(Document::new()));
		current = match entry {
			Value::Object(object) => object,
			other => return Err(format!("cannot set '{path}' inside {other}")),
		};
	}
	current.insert(last.to_string(), value);
	Ok(())
}

fn unset_path(document: &mut Document, path: &str) {
	match path.split_once('.') {
		Some((head, rest)) => {
			if let Some(Value::Object(object)) = document.get_mut(head) {
				unset_path(object, rest);
			}
		}
		None => {
			document.shift_remove(path);
		}
	}
}

fn apply_modifier(document: &mut Document, modifier: &Document) -> std::result::Result<(), String> {
	if !modifier.keys().any(|key| is_operator_key(key)) {
		let id = document.get("_id").cloned();
		document.retain(|key, _| key == "_id");
		for (key, value) in modifier {
			if key != "_id" || id.is_none() {
				document.insert(key.clone(), value.clone());
			}
		}
		return Ok(());
	}

	for (operator, fields) in modifier {
		let Value::Object(fields) = fields else {
			return Err(format!("{operator} needs a document"));
		};
		for (path, value) in fields {
			match operator.as_str() {
				"$set" => set_path(document, path, value.clone())?,
				"$unset" => unset_path(document, path),
				"$inc" => {
					let current = lookup(document, path).cloned().unwrap_or(Value::from(0));
					let sum = match (current.as_i64(), value.as_i64()) {
						(Some(a), Some(b)) => Value::from(a + b),
						_ => match (current.as_f64(), value.as_f64()) {
							(Some(a), Some(b)) => Value::from(a + b),
							_ => return Err(format!("cannot $inc '{path}' by {value}")),
						},
					};
					set_path(document, path, sum)?;
				}
				other => return Err(format!("unsupported update operator {other}")),
			}
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn doc(value: Value) -> Document {
		value.as_object().unwrap().clone()
	}

	#[test]
	fn test_matches() {
		let document = doc(json!({"_id": "1", "age": 30, "tags": ["a", "b"], "meta": {"level": 2}}));
		assert!(matches(&document, &doc(json!({"age": {"$gte": 30, "$lt": 40}}))).unwrap());
		assert!(matches(&document, &doc(json!({"tags": "a", "meta.level": 2}))).unwrap());
		assert!(matches(&document, &doc(json!({"$or": [{"age": 1}, {"_id": {"$in": ["1", "2"]}}]}))).unwrap());
		assert!(matches(&document, &doc(json!({"missing": null, "age": {"$ne": null}}))).unwrap());
		assert!(!matches(&document, &doc(json!({"age": {"$gt": "29"}}))).unwrap());
		assert!(matches(&document, &doc(json!({"age": {"$where": 1}}))).is_err());
	}

	#[test]
	fn test_apply_modifier() {
		let mut document = doc(json!({"_id": "1", "n": 1, "meta": {"a": 1, "b": 2}}));
		apply_modifier(&mut document, &doc(json!({"$inc": {"n": 2}, "$set": {"meta.c": 3}, "$unset": {"meta.a": ""}})))
			.unwrap();
		assert_eq!(Value::Object(document.clone()), json!({"_id": "1", "n": 3, "meta": {"b": 2, "c": 3}}));

		apply_modifier(&mut document, &doc(json!({"name": "x"}))).unwrap();
		assert_eq!(Value::Object(document), json!({"_id": "1", "name": "x"}));
	}

	#[test]
	fn test_project() {
		let document = doc(json!({"_id": "1", "a": 1, "b": 2}));
		assert_eq!(Value::Object(project(&document, &doc(json!({"a": 1}))).unwrap()), json!({"_id": "1", "a": 1}));
		assert_eq!(Value::Object(project(&document, &doc(json!({"a": 0, "_id": 0}))).unwrap()), json!({"b": 2}));
		assert!(project(&document, &doc(json!({"a": 1, "b": 0}))).is_err());
	}

	#[tokio::test]
	async fn test_find_sorts_and_pages() {
		let collection = MemoryDocumentCollection::new("users").with_documents(
			[json!({"_id": "b", "n": 2}), json!({"_id": "a", "n": 1}), json!({"_id": "c", "n": 3})].map(doc),
		);
		let options = FindOptions::default().with_sort(doc(json!({"n": -1}))).with_skip(1).with_limit(1);
		let found = collection.find(&Document::new(), &options).await.unwrap();
		assert_eq!(found, vec![doc(json!({"_id": "b", "n": 2}))]);
	}

	#[tokio::test]
	async fn test_after_find_hook_runs_once() {
		let collection = MemoryDocumentCollection::new("users");
		collection.after_find(1, |documents| documents.push(doc(json!({"_id": "late"}))));

		assert!(collection.find(&Document::new(), &FindOptions::default()).await.unwrap().is_empty());
		assert_eq!(collection.find(&Document::new(), &FindOptions::default()).await.unwrap().len(), 1);
		assert_eq!(collection.finds(), 2);
	}

	#[tokio::test]
	async fn test_upsert_and_duplicates() {
		let collection = MemoryDocumentCollection::new("users");
		let result = collection
			.update_one(&doc(json!({"email": "a@x"})), &doc(json!({"$set": {"name": "a"}})), &UpdateOptions::upsert())
			.await
			.unwrap();
		assert_eq!(result.matched, 0);
		let id = result.upserted_id.unwrap();
		assert_eq!(collection.get(&id).unwrap().get("name"), Some(&json!("a")));

		let err = collection.insert_one(&doc(json!({"_id": id}))).await.unwrap_err();
		assert!(matches!(err, CollectionError::Backend { backend: Backend::Document, .. }));
	}

	#[tokio::test]
	async fn test_fail_next() {
		let collection = MemoryDocumentCollection::new("users");
		collection.fail_next(Operation::Count, "offline");
		assert!(collection.count(&Document::new()).await.is_err());
		assert_eq!(collection.count(&Document::new()).await.unwrap(), 0);
	}
}
