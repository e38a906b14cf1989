//! Gemini reasoning engine.
//!
//! Speaks the `streamGenerateContent` REST API over server-sent events with
//! function calling. A turn is a loop: stream the model's answer, and if it
//! asked for tool calls, run them, append their results to the conversation
//! and stream again, until the model answers without calling anything.
//!
//! Conversation history is kept per session id, in memory only.

use crate::engine::{AgentEvent, EngineError, EventStream, ReasoningEngine, TurnInput};
use crate::tools::{ERROR_PREFIX, SqlTool, ToolSpec};
use async_stream::stream;
use futures_util::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// Standing instructions sent with every request.
pub const SYSTEM_INSTRUCTION: &str = "You are an expert Google Cloud SQL Database Agent.
Your capabilities:
1. Direct access to Cloud SQL via `run_mysql_query`.
2. Discovery: You must run `SHOW TABLES` and `DESCRIBE` to learn the schema.
3. Execution: Write valid MySQL queries.";

/// Settings for the Gemini engine.
pub struct GeminiConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: Url,
    /// Model/tool round trips allowed within one turn
    pub max_tool_rounds: u32,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url.as_str())
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish()
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }

    fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Some("model".to_string()),
            parts,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    /// Opaque; must be sent back with the part it arrived on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    fn function_response(name: impl Into<String>, result: String) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                name: name.into(),
                response: json!({ "result": result }),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: JsonValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Finish reasons after which the candidate carries no usable answer.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

/// Gemini rejects JSON Schema keywords outside its OpenAPI subset.
fn to_gemini_schema(schema: &JsonValue) -> JsonValue {
    match schema {
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .filter(|(k, _)| !matches!(k.as_str(), "$schema" | "title" | "additionalProperties"))
                .map(|(k, v)| (k.clone(), to_gemini_schema(v)))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(to_gemini_schema).collect()),
        other => other.clone(),
    }
}

fn function_declaration(spec: &ToolSpec) -> JsonValue {
    json!({
        "name": spec.name,
        "description": spec.description,
        "parameters": to_gemini_schema(&spec.parameters),
    })
}

// =============================================================================
// Engine
// =============================================================================

/// Reasoning engine backed by the Gemini API.
pub struct GeminiEngine {
    config: GeminiConfig,
    http: reqwest::Client,
    sessions: Mutex<HashMap<String, Vec<Content>>>,
}

impl GeminiEngine {
    pub fn new(config: GeminiConfig) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder().build()?;
        info!(model = %config.model, "Gemini engine ready");
        Ok(Self {
            config,
            http,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Number of stored messages for a session (user, model and tool turns).
    pub async fn history_len(&self, session_id: &str) -> usize {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn endpoint(&self) -> Result<Url, EngineError> {
        let path = format!("v1beta/models/{}:streamGenerateContent", self.config.model);
        let mut url = self
            .config
            .base_url
            .join(&path)
            .map_err(|e| EngineError::InvalidResponse(format!("Invalid model URL: {}", e)))?;
        url.query_pairs_mut().append_pair("alt", "sse");
        Ok(url)
    }

    fn request_body(&self, contents: &[Content], tool: &SqlTool) -> JsonValue {
        json!({
            "systemInstruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
            "contents": contents,
            "tools": [{ "functionDeclarations": [function_declaration(&tool.spec())] }],
        })
    }

    fn open_stream(&self, contents: &[Content], tool: &SqlTool) -> Result<EventSource, EngineError> {
        let request = self
            .http
            .post(self.endpoint()?)
            .header("x-goog-api-key", self.config.api_key.expose_secret())
            .json(&self.request_body(contents, tool));
        EventSource::new(request).map_err(|e| EngineError::InvalidResponse(e.to_string()))
    }

    async fn load_history(&self, session_id: &str) -> Vec<Content> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn store_history(&self, session_id: &str, contents: Vec<Content>) {
        self.sessions
            .lock()
            .await
            .insert(session_id.to_string(), contents);
    }
}

/// Map a transport-level SSE failure, reading the error body when there is one.
async fn stream_error(err: reqwest_eventsource::Error) -> EngineError {
    use reqwest_eventsource::Error as EsError;

    match err {
        EsError::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            if status.as_u16() == 429 {
                EngineError::RateLimited { message }
            } else {
                EngineError::ApiError {
                    status: status.as_u16(),
                    message,
                }
            }
        }
        EsError::InvalidContentType(content_type, _) => EngineError::InvalidResponse(format!(
            "expected an event stream, got {:?}",
            content_type
        )),
        EsError::Transport(e) => EngineError::Network(e),
        other => EngineError::Stream(other.to_string()),
    }
}

impl ReasoningEngine for GeminiEngine {
    fn submit<'a>(&'a self, input: TurnInput, tool: &'a SqlTool) -> EventStream<'a> {
        let events = stream! {
            let mut contents = self.load_history(&input.session_id).await;
            contents.push(Content::user(vec![Part::text(&input.text)]));
            debug!(session = %input.session_id, history = contents.len(), "Submitting turn");

            let mut rounds = 0u32;
            loop {
                let mut es = match self.open_stream(&contents, tool) {
                    Ok(es) => es,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                let mut model_parts: Vec<Part> = Vec::new();
                let mut calls: Vec<FunctionCall> = Vec::new();

                while let Some(event) = es.next().await {
                    match event {
                        Ok(Event::Open) => debug!("SSE stream open"),
                        Ok(Event::Message(msg)) => {
                            let chunk: StreamChunk = match serde_json::from_str(&msg.data) {
                                Ok(chunk) => chunk,
                                Err(e) => {
                                    es.close();
                                    yield Err(EngineError::Json(e));
                                    return;
                                }
                            };

                            if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
                                es.close();
                                yield Err(EngineError::Blocked { reason });
                                return;
                            }

                            for candidate in chunk.candidates.into_iter().take(1) {
                                if let Some(reason) = candidate.finish_reason.as_deref() {
                                    if BLOCKING_FINISH_REASONS.contains(&reason) {
                                        es.close();
                                        yield Err(EngineError::Blocked { reason: reason.to_string() });
                                        return;
                                    }
                                }
                                for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                                    if let Some(text) = &part.text {
                                        if !part.thought.unwrap_or(false) && !text.is_empty() {
                                            yield Ok(AgentEvent::AssistantText { text: text.clone() });
                                        }
                                    }
                                    if let Some(call) = &part.function_call {
                                        calls.push(call.clone());
                                    }
                                    model_parts.push(part);
                                }
                            }
                        }
                        // Normal end of the response; the source would reconnect if polled again
                        Err(reqwest_eventsource::Error::StreamEnded) => break,
                        Err(e) => {
                            es.close();
                            yield Err(stream_error(e).await);
                            return;
                        }
                    }
                }
                es.close();

                if !model_parts.is_empty() {
                    contents.push(Content::model(model_parts));
                }
                if calls.is_empty() {
                    break;
                }

                rounds += 1;
                if rounds > self.config.max_tool_rounds {
                    warn!(rounds, "Tool round limit reached");
                    yield Err(EngineError::ToolRoundsExceeded(self.config.max_tool_rounds));
                    return;
                }

                let mut responses = Vec::with_capacity(calls.len());
                for call in calls {
                    yield Ok(AgentEvent::ToolInvocation {
                        tool_name: call.name.clone(),
                        arguments: call.args.clone(),
                    });

                    let value = if call.name == tool.name() {
                        tool.invoke(&JsonValue::Object(call.args)).await
                    } else {
                        warn!(tool = %call.name, "Model called an unknown tool");
                        format!("{} unknown tool '{}'", ERROR_PREFIX, call.name)
                    };

                    yield Ok(AgentEvent::ToolResult {
                        tool_name: call.name.clone(),
                        value: value.clone(),
                    });
                    responses.push(Part::function_response(call.name, value));
                }
                contents.push(Content::user(responses));
            }

            self.store_history(&input.session_id, contents).await;
        };
        Box::pin(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_sanitized_recursively() {
        let schema = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "title": "RunQueryInput",
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "query": { "type": "string", "title": "Query", "description": "SQL" }
            },
            "required": ["query"]
        });
        assert_eq!(
            to_gemini_schema(&schema),
            json!({
                "type": "object",
                "properties": { "query": { "type": "string", "description": "SQL" } },
                "required": ["query"]
            })
        );
    }

    #[test]
    fn test_function_response_part_shape() {
        let part = Part::function_response("run_mysql_query", "Row Count: 0".to_string());
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(
            value,
            json!({
                "functionResponse": {
                    "name": "run_mysql_query",
                    "response": { "result": "Row Count: 0" }
                }
            })
        );
    }

    #[test]
    fn test_chunk_parsing_keeps_thought_signature() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[
                {"functionCall":{"name":"run_mysql_query","args":{"query":"SHOW TABLES"}},
                 "thoughtSignature":"abc"}
            ]}}]}"#,
        )
        .unwrap();
        let content = chunk.candidates[0].content.as_ref().unwrap();
        let part = &content.parts[0];
        assert_eq!(part.thought_signature.as_deref(), Some("abc"));
        assert_eq!(part.function_call.as_ref().unwrap().args["query"], "SHOW TABLES");
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let config = GeminiConfig {
            api_key: SecretString::from("AIza-secret".to_string()),
            model: "gemini-2.0-flash".into(),
            base_url: Url::parse("https://generativelanguage.googleapis.com").unwrap(),
            max_tool_rounds: 3,
        };
        assert!(!format!("{:?}", config).contains("AIza-secret"));
    }
}
