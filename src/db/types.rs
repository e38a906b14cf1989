//! Row decoding for result sets.
//!
//! Rows are turned into `serde_json::Value`s in column order, which keeps the
//! executor and the text renderer independent of the driver.
//!
//! MySQL columns are decoded by the server-reported type. Anything the typed
//! decoder rejects (DECIMAL, YEAR, zero dates, binary-collated SHOW output)
//! falls back to the raw text the server sent. SQLite is dynamically typed,
//! so its values are decoded by storage class instead of declared type.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::trace;

/// How a MySQL column's values are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Signed,
    Unsigned,
    Float,
    Bool,
    Json,
    Timestamp,
    DateTime,
    Date,
    Time,
    Bytes,
    Text,
    /// Read as the server's text form (DECIMAL keeps its exact digits)
    Raw,
}

impl ColumnKind {
    /// Classify by the type name sqlx reports for a MySQL column.
    pub fn for_mysql(type_name: &str) -> Self {
        match type_name.to_ascii_uppercase().as_str() {
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => Self::Signed,
            name if name.ends_with(" UNSIGNED") => Self::Unsigned,
            "BOOLEAN" => Self::Bool,
            "FLOAT" | "DOUBLE" => Self::Float,
            "JSON" => Self::Json,
            "TIMESTAMP" => Self::Timestamp,
            "DATETIME" => Self::DateTime,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
            | "GEOMETRY" => Self::Bytes,
            "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM"
            | "SET" => Self::Text,
            _ => Self::Raw,
        }
    }
}

/// Binary data as text when allowed and valid UTF-8, base64 otherwise.
pub fn binary_value(bytes: &[u8], decode_binary: bool) -> JsonValue {
    let text = if decode_binary {
        std::str::from_utf8(bytes).ok().map(str::to_string)
    } else {
        None
    };
    JsonValue::String(text.unwrap_or_else(|| STANDARD.encode(bytes)))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Converts a driver row into its values, in column order.
pub trait RowValues {
    fn to_values(&self, decode_binary: bool) -> Vec<JsonValue>;
}

impl RowValues for MySqlRow {
    fn to_values(&self, decode_binary: bool) -> Vec<JsonValue> {
        self.columns()
            .iter()
            .map(|col| {
                let kind = ColumnKind::for_mysql(col.type_info().name());
                mysql::value(self, col.ordinal(), kind, decode_binary)
            })
            .collect()
    }
}

impl RowValues for SqliteRow {
    fn to_values(&self, decode_binary: bool) -> Vec<JsonValue> {
        (0..self.columns().len())
            .map(|idx| sqlite::value(self, idx, decode_binary))
            .collect()
    }
}

mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn value(row: &MySqlRow, idx: usize, kind: ColumnKind, decode_binary: bool) -> JsonValue {
        let decoded: Result<Option<JsonValue>, sqlx::Error> = match kind {
            ColumnKind::Signed => row
                .try_get::<Option<i64>, _>(idx)
                .map(|v| v.map(JsonValue::from)),
            ColumnKind::Unsigned => row
                .try_get::<Option<u64>, _>(idx)
                .map(|v| v.map(JsonValue::from)),
            ColumnKind::Float => row
                .try_get::<Option<f64>, _>(idx)
                .map(|v| v.map(float_value)),
            ColumnKind::Bool => row
                .try_get::<Option<bool>, _>(idx)
                .map(|v| v.map(JsonValue::Bool)),
            ColumnKind::Json => row.try_get::<Option<JsonValue>, _>(idx),
            ColumnKind::Timestamp => row
                .try_get::<Option<DateTime<Utc>>, _>(idx)
                .map(|v| v.map(|ts| JsonValue::String(ts.naive_utc().to_string()))),
            ColumnKind::DateTime => row
                .try_get::<Option<NaiveDateTime>, _>(idx)
                .map(|v| v.map(|dt| JsonValue::String(dt.to_string()))),
            ColumnKind::Date => row
                .try_get::<Option<NaiveDate>, _>(idx)
                .map(|v| v.map(|d| JsonValue::String(d.to_string()))),
            ColumnKind::Time => row
                .try_get::<Option<NaiveTime>, _>(idx)
                .map(|v| v.map(|t| JsonValue::String(t.to_string()))),
            ColumnKind::Bytes => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .map(|v| v.map(|b| binary_value(&b, decode_binary))),
            ColumnKind::Text => row
                .try_get::<Option<String>, _>(idx)
                .map(|v| v.map(JsonValue::String)),
            ColumnKind::Raw => return raw_text(row, idx, decode_binary),
        };

        match decoded {
            Ok(Some(v)) => v,
            Ok(None) => JsonValue::Null,
            Err(e) => {
                trace!(column = idx, ?kind, error = %e, "Typed decode failed, using raw text");
                raw_text(row, idx, decode_binary)
            }
        }
    }

    /// The value's bytes exactly as the server sent them.
    fn raw_text(row: &MySqlRow, idx: usize, decode_binary: bool) -> JsonValue {
        match row.try_get_unchecked::<Option<Vec<u8>>, _>(idx) {
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(s) => JsonValue::String(s),
                Err(e) => binary_value(e.as_bytes(), decode_binary),
            },
            Ok(None) | Err(_) => JsonValue::Null,
        }
    }
}

mod sqlite {
    use super::*;

    pub fn value(row: &SqliteRow, idx: usize, decode_binary: bool) -> JsonValue {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if !raw.is_null() => raw.type_info().name().to_string(),
            _ => return JsonValue::Null,
        };

        let decoded = match storage.as_str() {
            "INTEGER" => row.try_get_unchecked::<i64, _>(idx).map(JsonValue::from),
            "REAL" => row.try_get_unchecked::<f64, _>(idx).map(float_value),
            "BLOB" => row
                .try_get_unchecked::<Vec<u8>, _>(idx)
                .map(|b| binary_value(&b, decode_binary)),
            _ => row
                .try_get_unchecked::<String, _>(idx)
                .map(JsonValue::String),
        };
        decoded.unwrap_or(JsonValue::Null)
    }
}
