//! Session loop
//!
//! Reads a line, hands it to the engine together with the SQL tool, and
//! drains the turn's event stream to the output before reading again. Exactly
//! one turn is in flight at a time.

use crate::engine::{AgentEvent, ReasoningEngine, TurnInput};
use crate::error::{AgentError, AgentResult};
use crate::tools::{ERROR_PREFIX, SqlTool};
use futures_util::StreamExt;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;
use tracing::{debug, info, warn};

/// Input prompt
pub const PROMPT: &str = "You: ";

/// What a read from the input source produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// The user pressed Ctrl-C at the prompt
    Interrupted,
    /// Input closed (Ctrl-D or end of a piped stdin)
    Eof,
}

/// Where user lines come from.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> AgentResult<ReadOutcome>;

    /// Record a submitted line for recall; a no-op for non-interactive sources.
    fn remember(&mut self, _line: &str) {}
}

/// Terminal input with line editing and history.
pub struct ConsoleInput {
    editor: DefaultEditor,
}

impl ConsoleInput {
    pub fn new() -> AgentResult<Self> {
        let editor = DefaultEditor::new()
            .map_err(|e| AgentError::session(format!("Failed to initialize readline: {}", e)))?;
        Ok(Self { editor })
    }
}

impl LineSource for ConsoleInput {
    fn read_line(&mut self, prompt: &str) -> AgentResult<ReadOutcome> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(ReadOutcome::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadOutcome::Eof),
            Err(err) => Err(AgentError::session(format!("Readline error: {}", err))),
        }
    }

    fn remember(&mut self, line: &str) {
        let _ = self.editor.add_history_entry(line);
    }
}

/// Where the loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingInput,
    Dispatching,
    StreamingEvents,
    Stopped,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `exit` or `quit`
    ExitKeyword,
    Interrupted,
    EndOfInput,
}

/// Process-wide conversation identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub session_id: String,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

/// Case-insensitive `exit` / `quit`, surrounding whitespace ignored.
pub fn is_exit_keyword(line: &str) -> bool {
    let line = line.trim();
    line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit")
}

/// The SQL being run, or the raw arguments when the model sent no `query`.
fn invocation_text(event: &AgentEvent) -> String {
    match (event.query_text(), event) {
        (Some(sql), _) => sql.to_string(),
        (None, AgentEvent::ToolInvocation { arguments, .. }) => {
            serde_json::Value::Object(arguments.clone()).to_string()
        }
        (None, _) => String::new(),
    }
}

/// The console conversation driver.
pub struct SessionLoop<E, I, W> {
    engine: E,
    tool: SqlTool,
    session: SessionState,
    input: I,
    out: W,
    state: LoopState,
}

impl<E, I, W> SessionLoop<E, I, W>
where
    E: ReasoningEngine,
    I: LineSource,
    W: Write,
{
    pub fn new(engine: E, tool: SqlTool, session: SessionState, input: I, out: W) -> Self {
        Self {
            engine,
            tool,
            session,
            input,
            out,
            state: LoopState::AwaitingInput,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Everything written so far.
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Run until the user leaves.
    ///
    /// Engine failures are reported inline and the loop carries on; only a
    /// broken input or output stream ends it with an error.
    pub async fn run(&mut self) -> AgentResult<StopReason> {
        info!(
            session = %self.session.session_id,
            connection = %self.tool.target(),
            "Session started"
        );

        loop {
            self.state = LoopState::AwaitingInput;
            let line = match self.input.read_line(PROMPT)? {
                ReadOutcome::Line(line) => line,
                ReadOutcome::Interrupted => {
                    writeln!(self.out, "\nStopped.")?;
                    return Ok(self.stop(StopReason::Interrupted));
                }
                ReadOutcome::Eof => {
                    writeln!(self.out)?;
                    return Ok(self.stop(StopReason::EndOfInput));
                }
            };

            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if is_exit_keyword(text) {
                return Ok(self.stop(StopReason::ExitKeyword));
            }

            self.input.remember(text);
            self.run_turn(text).await?;
        }
    }

    fn stop(&mut self, reason: StopReason) -> StopReason {
        self.state = LoopState::Stopped;
        self.out.flush().ok();
        info!(?reason, "Session stopped");
        reason
    }

    async fn run_turn(&mut self, text: &str) -> AgentResult<()> {
        self.state = LoopState::Dispatching;
        let input = TurnInput::new(self.session.session_id.clone(), text);
        let mut events = self.engine.submit(input, &self.tool);
        self.state = LoopState::StreamingEvents;

        // Whether the last thing printed was assistant prose
        let mut in_text = false;

        while let Some(event) = events.next().await {
            match event {
                Ok(AgentEvent::AssistantText { text }) => {
                    if !in_text {
                        write!(self.out, "\nAGENT: ")?;
                        in_text = true;
                    }
                    write!(self.out, "{}", text)?;
                    self.out.flush()?;
                }
                Ok(event @ AgentEvent::ToolInvocation { .. }) => {
                    if in_text {
                        writeln!(self.out)?;
                        in_text = false;
                    }
                    writeln!(self.out, "\nRUNNING SQL: {}", invocation_text(&event))?;
                    self.out.flush()?;
                }
                Ok(AgentEvent::ToolResult { tool_name, value }) => {
                    debug!(
                        tool = %tool_name,
                        failed = value.starts_with(ERROR_PREFIX),
                        "Tool result returned to the model"
                    );
                }
                Err(e) => {
                    if in_text {
                        writeln!(self.out)?;
                        in_text = false;
                    }
                    warn!(error = %e, retryable = e.is_retryable(), "Turn failed");
                    let err = AgentError::session(e.to_string());
                    writeln!(self.out, "\nError: {}", err)?;
                    break;
                }
            }
        }

        if in_text {
            writeln!(self.out)?;
        }
        self.out.flush()?;
        Ok(())
    }
}
