//! Reason-then-act natural-language dialect.
//!
//! ```text
//! Thought: I need the user's position.
//! Action: I should use the tool `GetLocation` with input `no parameters`
//! Observation: latitude 40.4168, longitude -3.7038
//! Final Answer: You are in Madrid.
//! ```
//!
//! Few-shot transcripts come from each tool's own [`ToolExample`]s.

use std::{fmt::Write, sync::LazyLock};

use {
    pocketcall_protocol::{ConversationMessage, DialectKind, ToolDescriptor, ToolExample, markers},
    regex::Regex,
};

use super::{Candidate, Dialect, Extraction, RawArguments, arguments_as_pairs};
use crate::compile_regex;

/// Tool transcripts included in the prompt, before the no-tool example.
const MAX_TOOL_EXAMPLES: usize = 2;

/// `Action: ... tool `NAME` with input `ARGS``. The input clause is optional.
static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(
        r"(?i)Action:[^\n`]*?\btool\s*`([^`]+)`(?:[^\n`]*?\binput\s*:?\s*`([^`]*)`)?",
    )
});

/// Classic two-line form: `Action: NAME` then `Action Input: ARGS`.
static ACTION_LINES_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r"(?m)^\s*Action:\s*([A-Za-z_][\w\-]*)\s*$(?:\s*^\s*Action Input:\s*(.*)$)?")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct ReactDialect;

impl Dialect for ReactDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::React
    }

    fn compile_schema(&self, tools: &[ToolDescriptor]) -> String {
        if tools.is_empty() {
            return String::new();
        }
        let mut out = String::from("You can use these tools:\n");
        for tool in tools {
            let params: Vec<&str> = tool.parameters.iter().map(|p| p.name.as_str()).collect();
            let _ = writeln!(out, "- {}({}): {}", tool.name, params.join(", "), tool.description);
        }
        out.push_str(
            "\nTo use a tool, reply exactly like this and then stop:\n\
             Thought: <what you need to find out>\n\
             Action: I should use the tool `TOOL_NAME` with input `key: value, ...`\n\
             Write `no parameters` as the input when the tool takes none.\n\
             You will then receive:\n\
             Observation: <the tool result>\n\
             When you know the answer, or no tool is needed, reply:\n\
             Final Answer: <your answer>\n",
        );

        let transcripts: Vec<String> = tools
            .iter()
            .filter_map(|t| t.examples.first().map(|ex| tool_transcript(t, ex)))
            .take(MAX_TOOL_EXAMPLES)
            .chain(std::iter::once(no_tool_transcript()))
            .collect();
        for (idx, transcript) in transcripts.iter().enumerate() {
            let _ = write!(out, "\nExample {}:\n{transcript}", idx + 1);
        }
        out
    }

    fn render_message(&self, message: &ConversationMessage) -> Option<String> {
        match message {
            ConversationMessage::User { content } => Some(format!("Question: {content}")),
            ConversationMessage::Assistant { content } => {
                Some(format!("{} {content}", markers::FINAL_ANSWER_PREFIX))
            },
            ConversationMessage::ToolCall {
                name, arguments, ..
            } => Some(action_line(name, &arguments_as_pairs(arguments))),
            ConversationMessage::ToolResult { content, .. } => {
                Some(format!("{} {content}", markers::OBSERVATION_PREFIX))
            },
            ConversationMessage::System { .. } | ConversationMessage::Reasoning { .. } => None,
        }
    }

    fn first_turn_prompt(&self, system_prompt: &str, schema: &str, user_message: &str) -> String {
        [
            system_prompt.trim().to_string(),
            schema.trim().to_string(),
            format!("Question: {}", user_message.trim()),
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
    }

    fn extract(&self, text: &str) -> Extraction {
        let action = find_action(text);
        let final_at = text.find(markers::FINAL_ANSWER_PREFIX);

        match (action, final_at) {
            (Some((at, candidate)), final_at) if final_at.is_none_or(|f| at < f) => {
                Extraction::Calls(vec![candidate])
            },
            (_, Some(f)) => {
                Extraction::Answer(text[f + markers::FINAL_ANSWER_PREFIX.len()..].to_string())
            },
            _ => Extraction::Unmarked,
        }
    }
}

/// Earliest action in either form, with its byte offset.
fn find_action(text: &str) -> Option<(usize, Candidate)> {
    let inline = ACTION_RE.captures(text).and_then(|c| {
        let at = c.get(0)?.start();
        let name = c.get(1)?.as_str();
        let args = c.get(2).map_or(RawArguments::Missing, |m| {
            RawArguments::Text(m.as_str().to_string())
        });
        Some((at, Candidate::new(name, args)))
    });
    let lines = ACTION_LINES_RE.captures(text).and_then(|c| {
        let at = c.get(0)?.start();
        let name = c.get(1)?.as_str();
        let args = c.get(2).map_or(RawArguments::Missing, |m| {
            RawArguments::Text(m.as_str().trim().to_string())
        });
        Some((at, Candidate::new(name, args)))
    });
    match (inline, lines) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn action_line(name: &str, input: &str) -> String {
    format!(
        "{} I should use the tool `{name}` with input `{input}`",
        markers::ACTION_PREFIX
    )
}

fn tool_transcript(tool: &ToolDescriptor, example: &ToolExample) -> String {
    format!(
        "Question: {}\nThought: I need to use {}.\n{}\n{} {}\n{} {}\n",
        example.query,
        tool.name,
        action_line(&tool.name, &arguments_as_pairs(&example.arguments)),
        markers::OBSERVATION_PREFIX,
        example.observation,
        markers::FINAL_ANSWER_PREFIX,
        example.answer,
    )
}

fn no_tool_transcript() -> String {
    format!(
        "Question: Hi! How are you?\nThought: This is small talk, no tool is needed.\n{} \
         I'm doing well, thank you! How can I help you today?\n",
        markers::FINAL_ANSWER_PREFIX
    )
}
