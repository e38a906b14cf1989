//! Database access layer.
//!
//! This module provides:
//! - Connection providers (Cloud SQL for MySQL, local SQLite)
//! - The per-call session guard
//! - Single-statement execution
//! - Row decoding
//! - A dispatch macro over the supported engines

#[macro_use]
pub mod macros;
pub mod cloudsql;
pub mod connection;
pub mod executor;
pub mod provider;
pub mod types;

pub use cloudsql::{AdminClient, CloudSqlProvider, Endpoint, HostOverride, TunnelOptions};
pub use connection::{ConnectionGuard, DbConnection, LiveConnections};
pub use executor::QueryExecutor;
pub use provider::{ConnectionProvider, SqliteProvider};
