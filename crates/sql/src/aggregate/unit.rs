// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use indexmap::IndexMap;
use mongo2pg_type::{DataType, Document, Relation};
use tracing::trace;

use super::{
	group::{compile_group, group_fields},
	stage::{Stage, StageKind},
};
use crate::{
	Atom, Lookup, Result, Scope, SelectParts, Source, Statement, compile_selector, ident::quote_ident, project, sort,
};

/// One accumulation level of a pipeline: the stages that fold into a single
/// select over `source`.
///
/// Units are values: applying a stage returns a new unit, either with the stage
/// folded in or wrapping this one as a derived source.
#[derive(Debug, Clone)]
pub struct Unit {
	relation: Relation,
	source: Source,
	lookups: Vec<Lookup>,
	filter: Option<Document>,
	sort: Option<Document>,
	skip: Option<u64>,
	limit: Option<u64>,
	project: Option<Document>,
	group: Option<Document>,
	count: Option<String>,
	/// The order of the source's rows, when the wrapped unit sorted them.
	inherited_sort: Option<Document>,
}

impl Unit {
	pub fn new(relation: Relation) -> Self {
		let source = Source::Table(relation.name().to_string());
		Self::over(relation, source)
	}

	fn over(relation: Relation, source: Source) -> Self {
		Self {
			relation,
			source,
			lookups: vec![],
			filter: None,
			sort: None,
			skip: None,
			limit: None,
			project: None,
			group: None,
			count: None,
			inherited_sort: None,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.occupied().next().is_none()
	}

	/// Whether the unit reads from a derived select rather than a table.
	pub fn is_derived(&self) -> bool {
		matches!(self.source, Source::Derived(_))
	}

	fn occupied(&self) -> impl Iterator<Item = StageKind> + '_ {
		[
			(!self.lookups.is_empty(), StageKind::Lookup),
			(self.filter.is_some(), StageKind::Match),
			(self.sort.is_some(), StageKind::Sort),
			(self.skip.is_some(), StageKind::Skip),
			(self.limit.is_some(), StageKind::Limit),
			(self.project.is_some(), StageKind::Project),
			(self.group.is_some(), StageKind::Group),
			(self.count.is_some(), StageKind::Count),
		]
		.into_iter()
		.filter_map(|(set, kind)| set.then_some(kind))
	}

	/// Whether `stage` folds into this unit without changing its meaning.
	///
	/// A grouped or counted unit accepts nothing more, and grouping or counting
	/// needs an empty unit. Otherwise a stage folds when its clause is free and
	/// no occupied clause applies after it; a match after a sort still folds
	/// because filtering commutes with ordering.
	pub fn accepts(&self, stage: &Stage) -> bool {
		if self.group.is_some() || self.count.is_some() {
			return false;
		}
		let kind = stage.kind();
		match kind {
			StageKind::Group | StageKind::Count => self.is_empty(),
			_ => self.occupied().all(|set| {
				if set == kind {
					kind == StageKind::Lookup
				} else {
					set.rank() < kind.rank() || (kind == StageKind::Match && set == StageKind::Sort)
				}
			}),
		}
	}

	/// Applies a stage, wrapping this unit first if the stage does not fold.
	pub fn apply(self, stage: Stage) -> Result<Unit> {
		if self.accepts(&stage) {
			Ok(self.fold(stage))
		} else {
			trace!(stage = ?stage.kind(), "stage does not fold, wrapping unit");
			Ok(self.wrap()?.fold(stage))
		}
	}

	fn fold(mut self, stage: Stage) -> Unit {
		match stage {
			Stage::Match(filter) => self.filter = Some(filter),
			Stage::Sort(order) => self.sort = Some(order),
			Stage::Limit(limit) => self.limit = Some(limit),
			Stage::Skip(skip) => self.skip = Some(skip),
			Stage::Project(projection) => self.project = Some(projection),
			Stage::Group(group) => self.group = Some(group),
			Stage::Count(name) => self.count = Some(name),
			Stage::Lookup(lookup) => self.lookups.push(lookup),
		}
		self
	}

	/// A new empty unit reading from this one's select.
	pub fn wrap(self) -> Result<Unit> {
		let fields = self.output_fields()?;
		let identity = self.relation.identity().to_string();
		let derived = Relation::derived(fields, Some(identity.as_str()));
		let inherited_sort = match (&self.sort, &self.group, &self.count) {
			(Some(order), None, None) if sort(order, &Scope::new(&derived)).is_ok() => Some(order.clone()),
			_ => None,
		};
		let statement = self.build()?.named();
		let mut unit = Unit::over(derived, Source::Derived(Box::new(statement)));
		unit.inherited_sort = inherited_sort;
		Ok(unit)
	}

	/// The relation stages resolve fields against: the source's columns plus the
	/// arrays added by lookups.
	fn scope_relation(&self) -> Relation {
		if self.lookups.is_empty() {
			self.relation.clone()
		} else {
			self.relation.with_fields(self.lookups.iter().map(|l| (l.alias.clone(), DataType::Jsonb)))
		}
	}

	fn output_fields(&self) -> Result<IndexMap<String, DataType>> {
		let relation = self.scope_relation();
		if let Some(group) = &self.group {
			return group_fields(group, &relation);
		}
		if let Some(name) = &self.count {
			let mut fields = IndexMap::new();
			fields.insert(name.clone(), DataType::BigInt);
			return Ok(fields);
		}
		if let Some(projection) = &self.project {
			return Ok(project(projection, &Scope::new(&relation))?.fields);
		}
		Ok(relation.fields().clone())
	}

	pub fn build(self) -> Result<Statement> {
		let relation = self.scope_relation();
		let scope = Scope::new(&relation);

		let mut parts = SelectParts {
			laterals: self.lookups.iter().map(Lookup::statement).collect(),
			limit: self.limit,
			offset: self.skip,
			..Default::default()
		};

		if let Some(group) = &self.group {
			let order = match &self.inherited_sort {
				Some(order) => sort(order, &scope)?,
				None => vec![],
			};
			let (projection, group_by) = compile_group(group, &scope, &order)?;
			parts.projection = projection;
			parts.group_by = group_by;
		} else if let Some(name) = &self.count {
			parts.projection = vec![Atom::text(format!("count(*) AS {}", quote_ident(name)))];
		} else if let Some(projection) = &self.project {
			let projected = project(projection, &scope)?;
			parts.projection = projected.atoms;
			parts.synthetic = projected.synthetic;
		}

		if let Some(filter) = &self.filter {
			parts.filter = compile_selector(filter, &scope)?;
		}
		if let Some(order) = &self.sort {
			parts.order_by = sort(order, &scope)?;
		}

		Ok(parts.build(self.source))
	}
}
