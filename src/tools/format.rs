//! Text rendering for tool results.
//!
//! The reasoning engine only ever sees strings, so these renderings are the
//! tool's wire format: stable prefixes the model (and the tests) can key on.

use crate::models::QueryResult;
use serde_json::Value as JsonValue;

/// Prefix of every failure string the tool returns.
pub const ERROR_PREFIX: &str = "SQL ERROR:";

/// Render a single value in SQL literal form.
pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => quote(s),
        JsonValue::Array(_) | JsonValue::Object(_) => quote(&value.to_string()),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// One row as a parenthesized tuple: `(1, 'bob', NULL)`.
pub fn format_row(row: &[JsonValue]) -> String {
    let values: Vec<String> = row.iter().map(format_value).collect();
    format!("({})", values.join(", "))
}

/// Render a failure message.
pub fn format_error(message: impl std::fmt::Display) -> String {
    format!("{} {}", ERROR_PREFIX, message)
}

/// Render an execution outcome.
///
/// A result set is always rendered in three parts, even when empty, so
/// "no rows" is distinguishable from "no result set".
pub fn format_result(result: &QueryResult) -> String {
    match result {
        QueryResult::Rows {
            columns,
            row_count,
            rows,
        } => {
            let names: Vec<String> = columns.iter().map(|c| quote(c)).collect();
            let mut output = format!(
                "Columns: [{}]\nRow Count: {}\nData:",
                names.join(", "),
                row_count
            );
            for row in rows {
                output.push('\n');
                output.push_str(&format_row(row));
            }
            output
        }
        QueryResult::Affected { row_count } => {
            format!("Action executed. Rows affected: {}", row_count)
        }
        QueryResult::Failure { message } => format_error(message),
    }
}
