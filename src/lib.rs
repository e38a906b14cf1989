//! Cloud SQL Agent Library
//!
//! A console agent that lets a hosted Gemini model answer questions about a
//! Google Cloud SQL for MySQL instance by calling a single `run_mysql_query`
//! tool.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod repl;
pub mod tools;

pub use config::Config;
pub use error::{AgentError, AgentResult};
pub use repl::SessionLoop;
pub use tools::SqlTool;
