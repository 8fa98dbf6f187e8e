// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use async_trait::async_trait;

use crate::{Compiled, DriverError, Result, Row};

/// Runs compiled statements.
#[async_trait]
pub trait Executor: Send + Sync {
	/// Returns every row the statement produces.
	async fn any(&self, query: &Compiled) -> Result<Vec<Row>>;

	/// Runs a statement for its effect and returns the affected row count.
	async fn none(&self, query: &Compiled) -> Result<u64>;

	/// Returns the single row the statement produces; zero or several rows are an error.
	async fn one(&self, query: &Compiled) -> Result<Row> {
		let mut rows = self.any(query).await?;
		match rows.len() {
			1 => Ok(rows.remove(0)),
			actual => Err(DriverError::unexpected_row_count(query, "1", actual)),
		}
	}

	/// Returns the row if there is one; several rows are an error.
	async fn optional(&self, query: &Compiled) -> Result<Option<Row>> {
		let mut rows = self.any(query).await?;
		match rows.len() {
			0 => Ok(None),
			1 => Ok(Some(rows.remove(0))),
			actual => Err(DriverError::unexpected_row_count(query, "0 or 1", actual)),
		}
	}
}

/// A transaction. Dropping it without committing rolls it back.
#[async_trait]
pub trait Transaction: Executor {
	async fn commit(self: Box<Self>) -> Result<()>;

	async fn rollback(self: Box<Self>) -> Result<()>;
}

/// A connection pool that can also open transactions.
#[async_trait]
pub trait Driver: Executor {
	async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	struct Fixed(Vec<Row>);

	#[async_trait]
	impl Executor for Fixed {
		async fn any(&self, _query: &Compiled) -> Result<Vec<Row>> {
			Ok(self.0.clone())
		}

		async fn none(&self, _query: &Compiled) -> Result<u64> {
			Ok(self.0.len() as u64)
		}
	}

	fn row(id: i64) -> Row {
		json!({"_id": id}).as_object().unwrap().clone()
	}

	fn query() -> Compiled {
		Compiled {
			sql: "SELECT 1".to_string(),
			args: vec![],
		}
	}

	#[tokio::test]
	async fn test_one() {
		assert_eq!(Fixed(vec![row(1)]).one(&query()).await.unwrap(), row(1));
		assert_eq!(
			Fixed(vec![]).one(&query()).await.unwrap_err(),
			DriverError::UnexpectedRowCount {
				sql: "SELECT 1".to_string(),
				expected: "1".to_string(),
				actual: 0,
			}
		);
	}

	#[tokio::test]
	async fn test_optional() {
		assert_eq!(Fixed(vec![]).optional(&query()).await.unwrap(), None);
		assert_eq!(Fixed(vec![row(1)]).optional(&query()).await.unwrap(), Some(row(1)));
		assert!(matches!(
			Fixed(vec![row(1), row(2)]).optional(&query()).await,
			Err(DriverError::UnexpectedRowCount { actual: 2, .. })
		));
	}
}
