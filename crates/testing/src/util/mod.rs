// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{cmp::Ordering, sync::Once};

use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt};

pub mod wait;

/// Orders values the way the in-memory backends sort and compare them:
/// missing and null first, then booleans, numbers, strings, arrays, objects.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
	fn rank(value: Option<&Value>) -> u8 {
		match value {
			None | Some(Value::Null) => 0,
			Some(Value::Bool(_)) => 1,
			Some(Value::Number(_)) => 2,
			Some(Value::String(_)) => 3,
			Some(Value::Array(_)) => 4,
			Some(Value::Object(_)) => 5,
		}
	}

	match (a, b) {
		(Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
		(Some(Value::Number(a)), Some(Value::Number(b))) => {
			a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal)
		}
		(Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
		(Some(Value::Array(a)), Some(Value::Array(b))) => {
			for (a, b) in a.iter().zip(b) {
				let ordering = compare_values(Some(a), Some(b));
				if ordering != Ordering::Equal {
					return ordering;
				}
			}
			a.len().cmp(&b.len())
		}
		_ => rank(a).cmp(&rank(b)),
	}
}

static TRACING: Once = Once::new();

/// Installs a fmt subscriber filtered by `RUST_LOG`, once per test binary.
pub fn init_tracing() {
	TRACING.call_once(|| {
		let _ = fmt().with_env_filter(EnvFilter::from_default_env()).with_test_writer().try_init();
	});
}
