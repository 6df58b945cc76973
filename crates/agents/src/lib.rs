//! Tool-calling engine for small on-device models: dialect compilers and
//! parsers, argument decoding, loop guard, turn management, streaming tag
//! classification and the generic turn driver.

pub mod arguments;
pub mod dialect;
pub mod error;
pub mod json_repair;
pub mod loop_guard;
pub mod response_sanitizer;
pub mod runner;
pub mod session;
pub mod stream;
pub mod tool_registry;
pub mod turn;

pub use {
    dialect::{Dialect, dialect_for},
    error::{Error, Result},
    runner::{OnFrame, QueryOutcome, TurnDriver},
    session::{InferenceSession, TextStream},
    stream::TagClassifier,
    tool_registry::{AgentTool, ToolRegistry},
    turn::{DialectState, TurnManager},
};

use regex::Regex;

/// Compile a pattern literal. Patterns are constants, so failure is a bug.
pub(crate) fn compile_regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(err) => panic!("invalid regex pattern `{pattern}`: {err}"),
    }
}
