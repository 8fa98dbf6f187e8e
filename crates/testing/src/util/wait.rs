// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Wait utilities for testing
//!
//! Background tasks such as target watchers change state on their own
//! schedule; these helpers poll for the expected state instead of sleeping a
//! fixed amount.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::trace;

/// Default timeout for wait operations (5 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default poll interval (1 millisecond)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Wait for a condition to become true, polling at regular intervals
///
/// # Panics
/// Panics if the condition doesn't become true within the timeout period
pub async fn wait_for_condition<F>(condition: F, timeout: Duration, poll_interval: Duration, timeout_message: &str)
where
	F: Fn() -> bool,
{
	let start = Instant::now();
	let mut poll_count = 0u64;

	while !condition() {
		if start.elapsed() > timeout {
			panic!("Timeout after {:?}: {} ({poll_count} polls)", timeout, timeout_message);
		}
		poll_count += 1;
		sleep(poll_interval).await;
	}
	trace!(polls = poll_count, elapsed = ?start.elapsed(), "{timeout_message}: condition met");
}

/// Wait for a condition with default timeout and poll interval
pub async fn wait_for<F>(condition: F, message: &str)
where
	F: Fn() -> bool,
{
	wait_for_condition(condition, DEFAULT_TIMEOUT, DEFAULT_POLL_INTERVAL, message).await;
}
