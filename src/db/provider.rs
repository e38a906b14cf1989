//! Connection providers.
//!
//! A provider knows how to open one fresh session against its target. The
//! tool asks for a session per call and releases it before returning, so
//! providers hold configuration and a live-session counter, never sockets.

use crate::db::connection::{ConnectionGuard, DbConnection, LiveConnections};
use crate::error::{AgentError, AgentResult};
use async_trait::async_trait;
use sqlx::ConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Opens sessions against a database.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Open a new, exclusively owned session.
    async fn open(&self) -> AgentResult<ConnectionGuard>;

    /// Human-readable name of the target, shown at startup and in logs.
    fn describe(&self) -> String;

    /// Sessions opened through this provider and not yet released.
    fn live_connections(&self) -> usize;
}

/// Opens sessions on a local SQLite file.
///
/// Used for offline runs and by the test suite; the session and transaction
/// behaviour is the same as against a managed instance.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    path: PathBuf,
    create_if_missing: bool,
    live: LiveConnections,
}

impl SqliteProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            create_if_missing: false,
            live: LiveConnections::new(),
        }
    }

    /// Create the database file on first open instead of failing.
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

#[async_trait]
impl ConnectionProvider for SqliteProvider {
    async fn open(&self) -> AgentResult<ConnectionGuard> {
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(self.create_if_missing);

        let conn = options.connect().await.map_err(|e| {
            AgentError::misconfigured(
                format!("Cannot open {}: {}", self.path.display(), e),
                "Check that the database file exists and is readable",
            )
        })?;

        debug!(path = %self.path.display(), "Opened SQLite session");
        Ok(ConnectionGuard::new(DbConnection::SQLite(conn), self.describe()).tracked(&self.live))
    }

    fn describe(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }

    fn live_connections(&self) -> usize {
        self.live.count()
    }
}
