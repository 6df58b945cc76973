//! Tag dialect: `<tool_call>{"name": ..., "arguments": {...}}</tool_call>`.
//!
//! Tools are listed as a JSON array inside `<tools></tools>`; results come
//! back inside `<tool_response></tool_response>`. A single response may
//! carry several calls.

use {
    pocketcall_protocol::{ConversationMessage, DialectKind, ToolDescriptor, markers},
    serde_json::{Value, json},
};

use super::{Candidate, Dialect, Extraction, RawArguments};
use crate::json_repair;

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlDialect;

impl Dialect for XmlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Xml
    }

    fn compile_schema(&self, tools: &[ToolDescriptor]) -> String {
        if tools.is_empty() {
            return String::new();
        }
        let functions: Vec<Value> = tools.iter().map(function_object).collect();
        let listing = serde_json::to_string(&functions).unwrap_or_else(|_| "[]".into());

        let mut out = String::with_capacity(listing.len() + 512);
        out.push_str("# Tools\n\n");
        out.push_str("You may call one or more functions to assist with the user query.\n\n");
        out.push_str("You are provided with function signatures within <tools></tools> XML tags:\n");
        out.push_str(markers::TOOLS_OPEN);
        out.push('\n');
        out.push_str(&listing);
        out.push('\n');
        out.push_str(markers::TOOLS_CLOSE);
        out.push_str(
            "\n\nFor each function call, return a json object with function name and arguments \
             within <tool_call></tool_call> XML tags:\n<tool_call>\n\
             {\"name\": <function-name>, \"arguments\": <args-json-object>}\n</tool_call>\n\n\
             If no function is needed, answer the user directly.",
        );
        out
    }

    fn render_message(&self, message: &ConversationMessage) -> Option<String> {
        match message {
            ConversationMessage::User { content } | ConversationMessage::Assistant { content } => {
                Some(content.clone())
            },
            ConversationMessage::ToolCall {
                name, arguments, ..
            } => Some(format!(
                "{}\n{}\n{}",
                markers::TOOL_CALL_OPEN,
                json!({ "name": name, "arguments": arguments }),
                markers::TOOL_CALL_CLOSE
            )),
            ConversationMessage::ToolResult { content, .. } => Some(format!(
                "{}\n{content}\n{}",
                markers::TOOL_RESPONSE_OPEN,
                markers::TOOL_RESPONSE_CLOSE
            )),
            ConversationMessage::System { .. } | ConversationMessage::Reasoning { .. } => None,
        }
    }

    fn extract(&self, text: &str) -> Extraction {
        let candidates: Vec<Candidate> = tool_call_bodies(text)
            .into_iter()
            .filter_map(candidate_from_body)
            .collect();
        if candidates.is_empty() {
            Extraction::Unmarked
        } else {
            Extraction::Calls(candidates)
        }
    }
}

/// `{type: "function", function: {name, description, parameters}}`.
fn function_object(tool: &ToolDescriptor) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters_schema(),
        }
    })
}

/// Bodies of every `<tool_call>` block, in order. A final block missing its
/// closer runs to the end of the text.
fn tool_call_bodies(text: &str) -> Vec<&str> {
    let mut bodies = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find(markers::TOOL_CALL_OPEN) {
        let after = &rest[open + markers::TOOL_CALL_OPEN.len()..];
        match after.find(markers::TOOL_CALL_CLOSE) {
            Some(close) => {
                bodies.push(after[..close].trim());
                rest = &after[close + markers::TOOL_CALL_CLOSE.len()..];
            },
            None => {
                bodies.push(after.trim());
                break;
            },
        }
    }
    bodies
}

fn candidate_from_body(body: &str) -> Option<Candidate> {
    let start = body.find('{')?;
    let end = json_repair::object_end(body, start).unwrap_or(body.len());
    let mut object = json_repair::parse_object(&body[start..end])?;
    let name = match object.remove("name").or_else(|| object.remove("tool"))? {
        Value::String(name) => name,
        _ => return None,
    };
    let arguments = object
        .remove("arguments")
        .or_else(|| object.remove("parameters"))
        .map_or(RawArguments::Missing, RawArguments::Json);
    Some(Candidate::new(name, arguments))
}
