//! Error types for the Cloud SQL agent.
//!
//! This module defines the error taxonomy using `thiserror`. Everything below
//! the tool boundary is eventually rendered to a string for the reasoning
//! engine, so each variant carries a message that reads well on its own.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    /// Fatal, detected before the session loop starts.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection failed: {message}")]
    Connection {
        message: String,
        suggestion: String,
        /// Network/auth hiccups are transient; bad instance names are not.
        transient: bool,
    },

    #[error("{message}")]
    Query {
        message: String,
        /// e.g., "42S02" for unknown table
        sql_state: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Connection is closed")]
    ConnectionClosed,

    /// Raised while draining the reasoning engine's event stream.
    #[error("{message}")]
    Loop { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a transient connection error (network, auth, TLS handshake).
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
            transient: true,
        }
    }

    /// Create a permanent connection error (misconfigured instance, missing address).
    pub fn misconfigured(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
            transient: false,
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a loop error.
    pub fn session(message: impl Into<String>) -> Self {
        Self::Loop {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Whether a later, user-initiated attempt could succeed unchanged.
    ///
    /// Nothing in the crate retries on its own; this only shapes diagnostics.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { transient, .. } => *transient,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Render as a single diagnostic line, the engine's error code included when known.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Query {
                message,
                sql_state: Some(code),
            } => format!("{} (code: {})", message, code),
            Self::Connection {
                message,
                suggestion,
                ..
            } => format!("Connection failed: {}. {}", message, suggestion),
            other => other.to_string(),
        }
    }
}

/// Convert sqlx errors to AgentError.
impl From<sqlx::Error> for AgentError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => AgentError::misconfigured(
                msg.to_string(),
                "Check the instance name, database name and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                AgentError::query(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => AgentError::query("No rows returned", None),
            sqlx::Error::PoolTimedOut => AgentError::timeout("connection acquire", 30),
            sqlx::Error::PoolClosed => {
                AgentError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => AgentError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and the instance's authorized networks",
            ),
            sqlx::Error::Tls(tls_err) => AgentError::connection(
                format!("TLS error: {}", tls_err),
                "Verify the instance's server CA certificate and SSL settings",
            ),
            sqlx::Error::Protocol(msg) => AgentError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => {
                AgentError::query(format!("Type not found: {}", type_name), None)
            }
            sqlx::Error::ColumnNotFound(col) => {
                AgentError::query(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => AgentError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                AgentError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                AgentError::internal(format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => AgentError::internal("Database worker crashed"),
            _ => AgentError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
