//! Interactive console.
//!
//! Provides the session loop that reads user turns, forwards them to the
//! reasoning engine and prints the resulting event stream.

mod session;

pub use session::{
    ConsoleInput, LineSource, LoopState, PROMPT, ReadOutcome, SessionLoop, SessionState,
    StopReason, is_exit_keyword,
};
