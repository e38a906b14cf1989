//! Tools exposed to the reasoning engine.
//!
//! - `sql`: the `run_mysql_query` tool
//! - `format`: its text wire format

pub mod format;
pub mod sql;

pub use format::ERROR_PREFIX;
pub use sql::{RunQueryInput, SqlTool, TOOL_DESCRIPTION, TOOL_NAME, ToolSpec};
