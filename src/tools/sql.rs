//! The `run_mysql_query` tool.
//!
//! The only capability the reasoning engine is given. Each call opens a fresh
//! session, runs exactly one statement in its own transaction and releases
//! the session before the result string is handed back.

use crate::db::{ConnectionProvider, QueryExecutor};
use crate::models::{QueryRequest, QueryResult};
use crate::tools::format::{format_error, format_result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name the tool is registered under.
pub const TOOL_NAME: &str = "run_mysql_query";

/// Description shown to the model.
pub const TOOL_DESCRIPTION: &str = "Executes a SQL query against Google Cloud SQL.";

/// Input for the `run_mysql_query` tool.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RunQueryInput {
    /// A single MySQL statement, sent to the database as-is
    pub query: String,
}

/// A tool declaration in engine-neutral form.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object
    pub parameters: JsonValue,
}

/// Handler for `run_mysql_query`.
pub struct SqlTool {
    provider: Arc<dyn ConnectionProvider>,
    executor: QueryExecutor,
}

impl SqlTool {
    /// Create a new SQL tool over `provider`.
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            provider,
            executor: QueryExecutor::new(),
        }
    }

    /// Create a new SQL tool with custom executor settings.
    pub fn with_executor(provider: Arc<dyn ConnectionProvider>, executor: QueryExecutor) -> Self {
        Self { provider, executor }
    }

    pub fn name(&self) -> &'static str {
        TOOL_NAME
    }

    /// What the tool is connected to.
    pub fn target(&self) -> String {
        self.provider.describe()
    }

    /// Declaration handed to the reasoning engine.
    pub fn spec(&self) -> ToolSpec {
        let schema = schemars::schema_for!(RunQueryInput);
        ToolSpec {
            name: TOOL_NAME.to_string(),
            description: TOOL_DESCRIPTION.to_string(),
            parameters: serde_json::to_value(&schema).unwrap_or(JsonValue::Null),
        }
    }

    /// Invoke with the engine's raw arguments object.
    ///
    /// Arguments that don't match `RunQueryInput` are reported back to the
    /// model as an error string, like any other failure.
    pub async fn invoke(&self, arguments: &JsonValue) -> String {
        match serde_json::from_value::<RunQueryInput>(arguments.clone()) {
            Ok(input) => self.run(&input.query).await,
            Err(e) => {
                warn!(error = %e, "Rejected tool arguments");
                format_error(format!("invalid arguments for {}: {}", TOOL_NAME, e))
            }
        }
    }

    /// Run one statement and render the outcome.
    ///
    /// Never fails: connection and statement errors come back as a string
    /// starting with `SQL ERROR:`.
    pub async fn run(&self, query: &str) -> String {
        info!(sql = %query, "Tool call");

        let mut guard = match self.provider.open().await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "Could not open a session");
                return format_error(e.diagnostic());
            }
        };

        let request = QueryRequest::new(query);
        let result = match guard.connection() {
            Ok(conn) => self.executor.execute(conn, &request).await,
            Err(e) => QueryResult::failure(e.diagnostic()),
        };
        guard.close().await;

        debug!(
            connection = %guard.label(),
            live_connections = self.provider.live_connections(),
            failed = result.is_failure(),
            "Tool call finished"
        );
        format_result(&result)
    }
}

impl std::fmt::Debug for SqlTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlTool")
            .field("name", &TOOL_NAME)
            .field("target", &self.provider.describe())
            .finish()
    }
}
