//! Statement execution.
//!
//! Every statement runs inside its own transaction on the caller's session:
//! - a statement that produces a result set is fetched in full, then committed
//! - a statement without one is executed for its affected-row count, then committed
//! - anything that fails is rolled back and reported as a `Failure`
//!
//! Whether a statement produces a result set is decided from its prepared
//! column metadata, so a `SELECT` matching zero rows still reports its columns.
//! MySQL cannot describe what a `CALL` returns, so statements it prepares
//! without columns are run over the text protocol and classified by what
//! actually comes back.
//!
//! # Architecture
//!
//! Engine-specific code lives in the `mysql` and `sqlite` submodules, kept
//! structurally parallel so the differences stand out.

use crate::db::connection::DbConnection;
use crate::error::AgentResult;
use crate::models::{QueryRequest, QueryResult};
use std::time::Instant;
use tracing::{debug, warn};

/// Runs one statement per call against an open session.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    decode_binary: bool,
}

impl QueryExecutor {
    /// Create a new executor with default settings.
    pub fn new() -> Self {
        Self {
            decode_binary: true,
        }
    }

    /// Render BLOB/BINARY values as text when they are valid UTF-8
    /// (otherwise, and when disabled, they are base64-encoded).
    pub fn decode_binary(mut self, decode: bool) -> Self {
        self.decode_binary = decode;
        self
    }

    /// Execute a single statement.
    ///
    /// Never returns an error: database and driver errors become
    /// `QueryResult::Failure` after the transaction has been rolled back.
    pub async fn execute(&self, conn: &mut DbConnection, request: &QueryRequest) -> QueryResult {
        let start = Instant::now();
        debug!(sql = %request.sql, db = %conn.database_type(), "Executing statement");

        let outcome = impl_db_dispatch!(conn, {
            MySql(c) => mysql::run(c, &request.sql, self.decode_binary).await,
            SQLite(c) => sqlite::run(c, &request.sql, self.decode_binary).await,
        });

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(result) => {
                match &result {
                    QueryResult::Rows { row_count, .. } => {
                        debug!(rows = row_count, elapsed_ms, "Statement returned rows")
                    }
                    QueryResult::Affected { row_count } => {
                        debug!(affected = row_count, elapsed_ms, "Statement committed")
                    }
                    QueryResult::Failure { .. } => {}
                }
                result
            }
            Err(e) => {
                warn!(error = %e, elapsed_ms, "Statement failed, transaction rolled back");
                QueryResult::failure(e.diagnostic())
            }
        }
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Dropping an uncommitted `Transaction` rolls it back, so every early return
// through `?` below leaves the session clean.

mod mysql {
    use super::*;
    use crate::db::types::RowValues;
    use futures_util::TryStreamExt;
    use sqlx::mysql::{MySql, MySqlConnection, MySqlDatabaseError};
    use sqlx::{Column, Connection, Either, Executor, Row, Statement, Transaction};

    /// ER_UNSUPPORTED_PS: the statement cannot be prepared (some SHOW/admin commands).
    const ER_UNSUPPORTED_PS: u16 = 1295;

    pub async fn run(
        conn: &mut MySqlConnection,
        sql: &str,
        decode_binary: bool,
    ) -> AgentResult<QueryResult> {
        let mut tx = conn.begin().await?;

        let result = match describe_columns(&mut tx, sql).await {
            Ok(columns) if columns.is_empty() => {
                run_unprepared(&mut tx, sql, decode_binary).await?
            }
            Ok(columns) => {
                let rows = (&mut *tx).fetch_all(sql).await?;
                let values = rows.iter().map(|r| r.to_values(decode_binary)).collect();
                QueryResult::rows(columns, values)
            }
            Err(e) if is_unpreparable(&e) => {
                debug!("Statement cannot be prepared, using the text protocol");
                run_unprepared(&mut tx, sql, decode_binary).await?
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;
        Ok(result)
    }

    async fn describe_columns(
        tx: &mut Transaction<'_, MySql>,
        sql: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        let statement = (&mut **tx).prepare(sql).await?;
        Ok(statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect())
    }

    /// Text-protocol execution: column names come from the first row, so an
    /// empty result set is indistinguishable from a statement without one.
    /// Affected counts are summed over every result a `CALL` produces.
    async fn run_unprepared(
        tx: &mut Transaction<'_, MySql>,
        sql: &str,
        decode_binary: bool,
    ) -> AgentResult<QueryResult> {
        let mut stream = sqlx::raw_sql(sql).fetch_many(&mut **tx);
        let mut columns: Option<Vec<String>> = None;
        let mut values = Vec::new();
        let mut affected = 0u64;

        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => affected += done.rows_affected(),
                Either::Right(row) => {
                    if columns.is_none() {
                        columns = Some(row.columns().iter().map(|c| c.name().to_string()).collect());
                    }
                    values.push(row.to_values(decode_binary));
                }
            }
        }

        Ok(match columns {
            Some(columns) => QueryResult::rows(columns, values),
            None => QueryResult::Affected {
                row_count: affected,
            },
        })
    }

    fn is_unpreparable(err: &sqlx::Error) -> bool {
        err.as_database_error()
            .and_then(|db| db.try_downcast_ref::<MySqlDatabaseError>())
            .map(|db| db.number() == ER_UNSUPPORTED_PS)
            .unwrap_or(false)
    }
}

mod sqlite {
    use super::*;
    use crate::db::types::RowValues;
    use sqlx::sqlite::{Sqlite, SqliteConnection};
    use sqlx::{Column, Connection, Executor, Statement, Transaction};

    pub async fn run(
        conn: &mut SqliteConnection,
        sql: &str,
        decode_binary: bool,
    ) -> AgentResult<QueryResult> {
        let mut tx = conn.begin().await?;

        let columns = describe_columns(&mut tx, sql).await?;
        let result = if columns.is_empty() {
            let done = (&mut *tx).execute(sql).await?;
            QueryResult::Affected {
                row_count: done.rows_affected(),
            }
        } else {
            let rows = (&mut *tx).fetch_all(sql).await?;
            let values = rows.iter().map(|r| r.to_values(decode_binary)).collect();
            QueryResult::rows(columns, values)
        };

        tx.commit().await?;
        Ok(result)
    }

    async fn describe_columns(
        tx: &mut Transaction<'_, Sqlite>,
        sql: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        let statement = (&mut **tx).prepare(sql).await?;
        Ok(statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::Connection;
    use sqlx::sqlite::SqliteConnection;

    async fn memory_db() -> DbConnection {
        let conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        DbConnection::SQLite(conn)
    }

    async fn run(conn: &mut DbConnection, sql: &str) -> QueryResult {
        QueryExecutor::new().execute(conn, &QueryRequest::new(sql)).await
    }

    #[tokio::test]
    async fn test_rows_keep_column_order() {
        let mut conn = memory_db().await;
        run(&mut conn, "CREATE TABLE users (id INTEGER, name TEXT, email TEXT)").await;
        run(&mut conn, "INSERT INTO users VALUES (1, 'bob', NULL)").await;

        let result = run(&mut conn, "SELECT email, id, name FROM users").await;
        assert_eq!(
            result,
            QueryResult::Rows {
                columns: vec!["email".into(), "id".into(), "name".into()],
                row_count: 1,
                rows: vec![vec![json!(null), json!(1), json!("bob")]],
            }
        );
    }

    #[tokio::test]
    async fn test_empty_select_still_reports_columns() {
        let mut conn = memory_db().await;
        run(&mut conn, "CREATE TABLE orders (id INTEGER, total REAL)").await;

        match run(&mut conn, "SELECT id, total FROM orders").await {
            QueryResult::Rows {
                columns, row_count, ..
            } => {
                assert_eq!(columns, vec!["id", "total"]);
                assert_eq!(row_count, 0);
            }
            other => panic!("Expected Rows, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_reports_affected_rows_and_commits() {
        let mut conn = memory_db().await;
        run(&mut conn, "CREATE TABLE t (id INTEGER)").await;

        let result = run(&mut conn, "INSERT INTO t VALUES (1), (2), (3)").await;
        assert_eq!(result, QueryResult::Affected { row_count: 3 });

        let result = run(&mut conn, "UPDATE t SET id = id + 10 WHERE id > 1").await;
        assert_eq!(result, QueryResult::Affected { row_count: 2 });

        match run(&mut conn, "SELECT COUNT(*) AS n FROM t").await {
            QueryResult::Rows { rows, .. } => assert_eq!(rows[0][0], json!(3)),
            other => panic!("Expected Rows, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ddl_is_affected_with_zero_rows() {
        let mut conn = memory_db().await;
        let result = run(&mut conn, "CREATE TABLE t (id INTEGER)").await;
        assert_eq!(result, QueryResult::Affected { row_count: 0 });
    }

    #[tokio::test]
    async fn test_syntax_error_is_failure() {
        let mut conn = memory_db().await;
        let result = run(&mut conn, "SELEC * FROM nowhere").await;
        match result {
            QueryResult::Failure { message } => assert!(message.contains("syntax error")),
            other => panic!("Expected Failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_statement_leaves_no_partial_write() {
        let mut conn = memory_db().await;
        run(&mut conn, "CREATE TABLE t (id INTEGER PRIMARY KEY)").await;
        run(&mut conn, "INSERT INTO t VALUES (1)").await;

        // The second row collides, so the whole statement must be undone
        let result = run(&mut conn, "INSERT INTO t VALUES (2), (1)").await;
        assert!(result.is_failure());

        match run(&mut conn, "SELECT id FROM t ORDER BY id").await {
            QueryResult::Rows { rows, .. } => assert_eq!(rows, vec![vec![json!(1)]]),
            other => panic!("Expected Rows, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_returning_clause_is_rows_and_committed() {
        let mut conn = memory_db().await;
        run(&mut conn, "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)").await;

        let result = run(&mut conn, "INSERT INTO t (name) VALUES ('a') RETURNING id").await;
        assert_eq!(result, QueryResult::rows(vec!["id".into()], vec![vec![json!(1)]]));

        match run(&mut conn, "SELECT COUNT(*) FROM t").await {
            QueryResult::Rows { rows, .. } => assert_eq!(rows[0][0], json!(1)),
            other => panic!("Expected Rows, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_session_usable_after_failure() {
        let mut conn = memory_db().await;
        assert!(run(&mut conn, "SELECT * FROM missing").await.is_failure());
        assert_eq!(
            run(&mut conn, "SELECT 1 AS one").await,
            QueryResult::rows(vec!["one".into()], vec![vec![json!(1)]])
        );
    }
}
