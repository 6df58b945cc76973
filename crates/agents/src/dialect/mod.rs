//! Tool-calling dialects.
//!
//! Each dialect is a small strategy: how to present tools in the prompt,
//! how to frame the first and later turns, and where tool markers sit in a
//! response. Everything after marker extraction (loop guard, registry check,
//! argument decoding, plain-text fallback) is shared in [`resolve`].

pub mod minimal_tag;
pub mod native;
pub mod react;
pub mod xml;

use std::sync::Arc;

use {
    pocketcall_protocol::{ConversationMessage, DialectKind, ParsedOutcome, ToolDescriptor},
    serde_json::Value,
    tracing::{debug, warn},
};

use crate::{arguments, loop_guard, response_sanitizer::clean_response};

pub use {
    minimal_tag::MinimalTagDialect, native::NativeDialect, react::ReactDialect, xml::XmlDialect,
};

/// Arguments exactly as a dialect found them.
#[derive(Debug, Clone, PartialEq)]
pub enum RawArguments {
    /// Already JSON (tag dialects).
    Json(Value),
    /// Free-form text (natural-language dialects).
    Text(String),
    /// The marker carried no argument section.
    Missing,
}

/// A tool request found in model text, not yet validated.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub arguments: RawArguments,
}

impl Candidate {
    pub fn new(name: impl Into<String>, arguments: RawArguments) -> Self {
        Self {
            name: name.into().trim().to_string(),
            arguments,
        }
    }
}

/// What a dialect found in a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// One or more tool markers, in order of appearance.
    Calls(Vec<Candidate>),
    /// An explicit answer marker (e.g. `Final Answer:`), with its text.
    Answer(String),
    /// No marker at all.
    Unmarked,
}

/// One textual tool-calling convention.
pub trait Dialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    /// Render tools for the prompt. Empty when there are no tools.
    fn compile_schema(&self, tools: &[ToolDescriptor]) -> String;

    /// The full first-turn prompt: system text, compiled schema, first user message.
    fn first_turn_prompt(&self, system_prompt: &str, schema: &str, user_message: &str) -> String {
        [system_prompt.trim(), schema.trim(), user_message.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Re-serialize one history message into this dialect's wire syntax for
    /// an incremental prompt. `None` for messages that never go on the wire.
    fn render_message(&self, message: &ConversationMessage) -> Option<String>;

    /// Locate dialect markers in a response.
    fn extract(&self, text: &str) -> Extraction;

    /// Turn a raw response into outcomes.
    fn parse(
        &self,
        text: &str,
        tools: &[ToolDescriptor],
        history: &[ConversationMessage],
    ) -> Vec<ParsedOutcome> {
        resolve(self.extract(text), text, tools, history)
    }
}

/// Build the strategy for `kind`.
pub fn dialect_for(kind: DialectKind) -> Arc<dyn Dialect> {
    match kind {
        DialectKind::Native => Arc::new(NativeDialect),
        DialectKind::Xml => Arc::new(XmlDialect),
        DialectKind::React => Arc::new(ReactDialect),
        DialectKind::MinimalTag => Arc::new(MinimalTagDialect),
    }
}

/// Shared tail of every parser.
pub fn resolve(
    extraction: Extraction,
    raw: &str,
    tools: &[ToolDescriptor],
    history: &[ConversationMessage],
) -> Vec<ParsedOutcome> {
    match extraction {
        Extraction::Calls(candidates) if !candidates.is_empty() => candidates
            .into_iter()
            .map(|c| resolve_candidate(c, tools, history))
            .collect(),
        Extraction::Answer(text) => vec![ParsedOutcome::text_answer(clean_response(&text))],
        Extraction::Calls(_) | Extraction::Unmarked => {
            vec![ParsedOutcome::text_answer(clean_response(raw))]
        },
    }
}

fn resolve_candidate(
    candidate: Candidate,
    tools: &[ToolDescriptor],
    history: &[ConversationMessage],
) -> ParsedOutcome {
    let Candidate { name, arguments } = candidate;

    if let Some(prior) = loop_guard::repeated_result(history, &name) {
        warn!(tool = %name, "loop guard intercepted repeat call, answering from prior result");
        return ParsedOutcome::LoopBreak {
            prior_result: prior.to_string(),
            name,
        };
    }

    let Some(tool) = tools.iter().find(|t| t.name == name) else {
        warn!(tool = %name, "model requested unknown tool");
        return ParsedOutcome::UnknownTool { name };
    };

    let arguments = match arguments {
        RawArguments::Json(value) => arguments::coerce_arguments(value, tool),
        RawArguments::Text(text) => arguments::decode_arguments(&text, tool),
        RawArguments::Missing => Value::Object(serde_json::Map::new()),
    };
    debug!(tool = %name, %arguments, "parsed tool invocation");
    ParsedOutcome::ToolInvocation { name, arguments }
}

/// `key: value, ...` rendering of a JSON argument object, or `no parameters`.
pub(crate) fn arguments_as_pairs(arguments: &Value) -> String {
    let Some(map) = arguments.as_object().filter(|m| !m.is_empty()) else {
        return pocketcall_protocol::markers::NO_PARAMETERS.to_string();
    };
    map.iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{k}: {s}"),
            other => format!("{k}: {other}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
