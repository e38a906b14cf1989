//! Live database sessions and their release guard.
//!
//! The agent never pools. Every tool call opens one session, runs one
//! statement on it and releases it, so the only state that outlives a call
//! is the live-connection counter shared with the provider.

use crate::error::{AgentError, AgentResult};
use crate::models::DatabaseType;
use sqlx::Connection;
use sqlx::mysql::MySqlConnection;
use sqlx::sqlite::SqliteConnection;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// A single open session with one of the supported engines.
pub enum DbConnection {
    MySql(MySqlConnection),
    SQLite(SqliteConnection),
}

impl DbConnection {
    /// Get the database type.
    pub fn database_type(&self) -> DatabaseType {
        impl_db_dispatch!(self, {
            MySql(_c) => DatabaseType::MySQL,
            SQLite(_c) => DatabaseType::SQLite,
        })
    }

    /// Gracefully terminate the session.
    pub async fn close(self) -> AgentResult<()> {
        impl_db_dispatch!(self, {
            MySql(c) => c.close().await?,
            SQLite(c) => c.close().await?,
        });
        Ok(())
    }
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DbConnection({})", self.database_type())
    }
}

/// Counts sessions that have been opened but not yet released.
#[derive(Debug, Clone, Default)]
pub struct LiveConnections(Arc<AtomicUsize>);

impl LiveConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently open.
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn acquire(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owns an open session and guarantees it is released exactly once.
///
/// `close` is the normal path. If the guard is dropped while still holding
/// the session (a panic or a cancelled future), the socket is dropped with it
/// and the counter is still decremented.
#[derive(Debug)]
pub struct ConnectionGuard {
    conn: Option<DbConnection>,
    label: String,
    live: Option<LiveConnections>,
}

impl ConnectionGuard {
    /// Wrap a freshly opened session.
    pub fn new(conn: DbConnection, label: impl Into<String>) -> Self {
        Self {
            conn: Some(conn),
            label: label.into(),
            live: None,
        }
    }

    /// Report this session in `live` until it is released.
    pub fn tracked(mut self, live: &LiveConnections) -> Self {
        if self.live.is_none() && self.conn.is_some() {
            live.acquire();
            self.live = Some(live.clone());
        }
        self
    }

    /// What this session is connected to, for logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Borrow the session; fails once the guard has been closed.
    pub fn connection(&mut self) -> AgentResult<&mut DbConnection> {
        self.conn.as_mut().ok_or(AgentError::ConnectionClosed)
    }

    /// Release the session. Idempotent, and never fails: an error while
    /// saying goodbye to the server is logged, not surfaced.
    pub async fn close(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        self.mark_released();

        match conn.close().await {
            Ok(()) => debug!(connection = %self.label, "Connection closed"),
            Err(e) => warn!(
                connection = %self.label,
                error = %e,
                "Connection close failed, socket dropped"
            ),
        }
    }

    fn mark_released(&mut self) {
        if let Some(live) = self.live.take() {
            live.release();
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            debug!(connection = %self.label, "Connection dropped without close");
        }
        self.mark_released();
    }
}
