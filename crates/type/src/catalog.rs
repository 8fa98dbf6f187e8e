// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::collections::HashMap;

use crate::Relation;

/// Looks up relations by name, e.g. the target of a `$lookup` stage.
pub trait Catalog {
	fn relation(&self, name: &str) -> Option<&Relation>;
}

impl Catalog for [Relation] {
	fn relation(&self, name: &str) -> Option<&Relation> {
		self.iter().find(|r| r.name() == name)
	}
}

impl Catalog for Vec<Relation> {
	fn relation(&self, name: &str) -> Option<&Relation> {
		self.as_slice().relation(name)
	}
}

impl Catalog for HashMap<String, Relation> {
	fn relation(&self, name: &str) -> Option<&Relation> {
		self.get(name)
	}
}
