//! Reasoning engine abstraction.
//!
//! An engine takes one user turn and answers with a lazy, finite stream of
//! events. Tool calls happen inside the stream: the engine invokes the bound
//! `SqlTool` itself and reports both the invocation and its result as events.

use crate::tools::SqlTool;
use futures_util::stream::BoxStream;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

mod error;
pub mod gemini;

pub use error::EngineError;
pub use gemini::{GeminiConfig, GeminiEngine};

/// One observable step of a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A chunk of model prose. Consecutive chunks belong to the same answer.
    AssistantText { text: String },
    /// The model asked for a tool call.
    ToolInvocation {
        tool_name: String,
        arguments: Map<String, JsonValue>,
    },
    /// What the tool returned to the model.
    ToolResult { tool_name: String, value: String },
}

impl AgentEvent {
    /// The SQL text of a `run_mysql_query` invocation, if this is one.
    pub fn query_text(&self) -> Option<&str> {
        match self {
            AgentEvent::ToolInvocation { arguments, .. } => {
                arguments.get("query").and_then(JsonValue::as_str)
            }
            _ => None,
        }
    }
}

/// A user message addressed to a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnInput {
    pub session_id: String,
    pub text: String,
}

impl TurnInput {
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            text: text.into(),
        }
    }
}

/// Events of a single turn, in arrival order.
pub type EventStream<'a> = BoxStream<'a, Result<AgentEvent, EngineError>>;

/// A hosted model that can answer turns and call the SQL tool.
pub trait ReasoningEngine: Send + Sync {
    /// Submit one turn. `tool` is the only capability the model may call.
    ///
    /// Nothing is sent until the stream is first polled.
    fn submit<'a>(&'a self, input: TurnInput, tool: &'a SqlTool) -> EventStream<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_text() {
        let mut arguments = Map::new();
        arguments.insert("query".into(), json!("SHOW TABLES;"));
        let event = AgentEvent::ToolInvocation {
            tool_name: "run_mysql_query".into(),
            arguments,
        };
        assert_eq!(event.query_text(), Some("SHOW TABLES;"));

        let text = AgentEvent::AssistantText {
            text: "hello".into(),
        };
        assert_eq!(text.query_text(), None);
    }

    #[test]
    fn test_event_serialization() {
        let event = AgentEvent::ToolResult {
            tool_name: "run_mysql_query".into(),
            value: "Action executed. Rows affected: 1".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool_result");
        assert_eq!(value["tool_name"], "run_mysql_query");
    }
}
