//! Minimal tag dialect for very small models.
//!
//! ```text
//! <function>GetWeather</function>
//! <parameters>{"city": "Paris"}</parameters>
//! ```
//!
//! `<function>none</function>` means "answer without a tool"; whatever
//! follows it is the answer.

use std::fmt::Write;

use {
    pocketcall_protocol::{ConversationMessage, DialectKind, ToolDescriptor, markers},
    serde_json::{Map, Value},
};

use super::{Candidate, Dialect, Extraction, RawArguments};

#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalTagDialect;

impl Dialect for MinimalTagDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::MinimalTag
    }

    fn compile_schema(&self, tools: &[ToolDescriptor]) -> String {
        let Some(first) = tools.first() else {
            return String::new();
        };

        let mut out = String::from(
            "Rules:\n\
             1. To use a tool, reply with <function>TOOL_NAME</function> followed by \
             <parameters>{JSON arguments}</parameters> and nothing else.\n\
             2. If no tool is needed, reply with <function>none</function> followed by your answer.\n\
             3. Use only the tools listed below.\n\nTools:\n",
        );
        for tool in tools {
            let _ = writeln!(out, "- {}: {}", tool.name, tool.description);
            for param in &tool.parameters {
                let required = if param.required { ", required" } else { "" };
                let _ = write!(out, "    {} ({}{required})", param.name, param.param_type);
                if param.description.is_empty() {
                    out.push('\n');
                } else {
                    let _ = writeln!(out, ": {}", param.description);
                }
            }
        }

        let arguments = example_arguments(first);
        let _ = write!(
            out,
            "\nExample 1:\n{}{}{}\n{}{}{}\n",
            markers::FUNCTION_OPEN,
            first.name,
            markers::FUNCTION_CLOSE,
            markers::PARAMETERS_OPEN,
            arguments,
            markers::PARAMETERS_CLOSE,
        );
        let _ = write!(
            out,
            "\nExample 2:\n{}{}{}\nHello! How can I help you today?\n",
            markers::FUNCTION_OPEN,
            markers::FUNCTION_NONE,
            markers::FUNCTION_CLOSE,
        );
        out
    }

    fn render_message(&self, message: &ConversationMessage) -> Option<String> {
        match message {
            ConversationMessage::User { content } => Some(content.clone()),
            ConversationMessage::Assistant { content } => Some(format!(
                "{}{}{}\n{content}",
                markers::FUNCTION_OPEN,
                markers::FUNCTION_NONE,
                markers::FUNCTION_CLOSE
            )),
            ConversationMessage::ToolCall {
                name, arguments, ..
            } => Some(format!(
                "{}{name}{}\n{}{arguments}{}",
                markers::FUNCTION_OPEN,
                markers::FUNCTION_CLOSE,
                markers::PARAMETERS_OPEN,
                markers::PARAMETERS_CLOSE
            )),
            ConversationMessage::ToolResult { name, content } => {
                Some(format!("Result of {name}: {content}"))
            },
            ConversationMessage::System { .. } | ConversationMessage::Reasoning { .. } => None,
        }
    }

    fn extract(&self, text: &str) -> Extraction {
        let Some(open) = text.find(markers::FUNCTION_OPEN) else {
            return Extraction::Unmarked;
        };
        let after_open = &text[open + markers::FUNCTION_OPEN.len()..];
        let Some(close) = after_open.find(markers::FUNCTION_CLOSE) else {
            return Extraction::Unmarked;
        };
        let name = after_open[..close].trim();
        let rest = &after_open[close + markers::FUNCTION_CLOSE.len()..];

        if name.is_empty() {
            return Extraction::Unmarked;
        }
        if name.eq_ignore_ascii_case(markers::FUNCTION_NONE) {
            return Extraction::Answer(rest.to_string());
        }
        Extraction::Calls(vec![Candidate::new(name, parameters_section(rest))])
    }
}

/// Body of a `<parameters>` block after the function tag. The closer is
/// optional; a truncated block runs to the end of the text.
fn parameters_section(rest: &str) -> RawArguments {
    let Some(open) = rest.find(markers::PARAMETERS_OPEN) else {
        return RawArguments::Missing;
    };
    let body = &rest[open + markers::PARAMETERS_OPEN.len()..];
    let body = body
        .find(markers::PARAMETERS_CLOSE)
        .map_or(body, |close| &body[..close]);
    RawArguments::Text(body.trim().to_string())
}

/// The tool's own example arguments, or typed placeholders.
fn example_arguments(tool: &ToolDescriptor) -> Value {
    if let Some(example) = tool.examples.first() {
        return example.arguments.clone();
    }
    let map: Map<String, Value> = tool
        .parameters
        .iter()
        .map(|p| (p.name.clone(), Value::String(format!("<{}>", p.param_type))))
        .collect();
    Value::Object(map)
}
