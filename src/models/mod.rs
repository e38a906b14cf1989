//! Data models for the Cloud SQL agent.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{Credentials, DatabaseType, InstanceName, NetworkMode};
pub use query::{QueryRequest, QueryResult};
