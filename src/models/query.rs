//! Query-related data models.
//!
//! This module defines the statement a tool call submits and the normalized
//! outcome the executor hands back.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One statement, exactly as the reasoning engine produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
}

impl QueryRequest {
    /// Create a new query request.
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }
}

/// Outcome of executing one statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryResult {
    /// The statement produced a result set.
    Rows {
        /// Column names in result-set metadata order
        columns: Vec<String>,
        row_count: usize,
        /// Each row's values in column order
        rows: Vec<Vec<JsonValue>>,
    },
    /// The statement changed data (or schema) and returned no result set.
    Affected { row_count: u64 },
    /// Anything the database or the driver rejected.
    Failure { message: String },
}

impl QueryResult {
    /// Build a `Rows` result, deriving the count from the rows themselves.
    pub fn rows(columns: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Self {
        Self::Rows {
            columns,
            row_count: rows.len(),
            rows,
        }
    }

    /// Build a `Failure` result.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_counts_rows() {
        let result = QueryResult::rows(
            vec!["id".into(), "name".into()],
            vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]],
        );
        match result {
            QueryResult::Rows { row_count, .. } => assert_eq!(row_count, 2),
            other => panic!("Expected Rows, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_rows_is_not_failure() {
        let result = QueryResult::rows(vec!["id".into()], vec![]);
        assert!(!result.is_failure());
    }

    #[test]
    fn test_failure() {
        assert!(QueryResult::failure("boom").is_failure());
        assert!(!QueryResult::Affected { row_count: 3 }.is_failure());
    }

    #[test]
    fn test_serialized_tag() {
        let value = serde_json::to_value(QueryResult::Affected { row_count: 1 }).unwrap();
        assert_eq!(value["kind"], "affected");
        assert_eq!(value["row_count"], 1);
    }
}
