//! Schema-free dialect.
//!
//! The inference runtime receives the tools itself (`set_tools_and_reset`),
//! so nothing is compiled into the prompt. The model answers a tool request
//! with a bare JSON object: `{"tool": "NAME", "arguments": {...}}`.

use {
    pocketcall_protocol::{ConversationMessage, DialectKind, ToolDescriptor, markers},
    serde_json::{Map, Value},
};

use super::{Candidate, Dialect, Extraction, RawArguments};
use crate::json_repair;

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDialect;

impl Dialect for NativeDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Native
    }

    fn compile_schema(&self, _tools: &[ToolDescriptor]) -> String {
        String::new()
    }

    fn render_message(&self, message: &ConversationMessage) -> Option<String> {
        match message {
            ConversationMessage::User { content } | ConversationMessage::Assistant { content } => {
                Some(content.clone())
            },
            ConversationMessage::ToolCall {
                name, arguments, ..
            } => Some(serde_json::json!({ "tool": name, "arguments": arguments }).to_string()),
            ConversationMessage::ToolResult { name, content } => {
                Some(format!("Result of {name}: {content}"))
            },
            ConversationMessage::System { .. } | ConversationMessage::Reasoning { .. } => None,
        }
    }

    fn extract(&self, text: &str) -> Extraction {
        match first_tool_object(text) {
            Some(candidate) => Extraction::Calls(vec![candidate]),
            None => Extraction::Unmarked,
        }
    }
}

/// First `{"tool": ...}` object in `text`, brace-matched and leniently parsed.
fn first_tool_object(text: &str) -> Option<Candidate> {
    let needle = format!("\"{}\"", markers::JSON_TOOL_KEY);
    let mut search_from = 0;

    while let Some(hit_rel) = text[search_from..].find(&needle) {
        let hit = search_from + hit_rel;
        search_from = hit + needle.len();

        if let Some(candidate) = enclosing_tool_object(text, hit) {
            return Some(candidate);
        }
    }
    None
}

/// Innermost object around byte offset `hit` whose own `tool` key is a string.
///
/// Braces before `hit` are tried from nearest outward; objects that close
/// before `hit` (e.g. a nested `arguments` value) do not contain it.
fn enclosing_tool_object(text: &str, hit: usize) -> Option<Candidate> {
    for (start, _) in text[..hit].rmatch_indices('{') {
        let end = json_repair::object_end(text, start).unwrap_or(text.len());
        if end <= hit {
            continue;
        }
        let Some(mut object) = json_repair::parse_object(&text[start..end]) else {
            continue;
        };
        if let Some(Value::String(name)) = object.remove(markers::JSON_TOOL_KEY) {
            return Some(Candidate::new(name, arguments_of(object)));
        }
    }
    None
}

/// `arguments` (or `parameters`/`args`) when present, otherwise the
/// remaining keys of the object.
fn arguments_of(mut object: Map<String, Value>) -> RawArguments {
    for key in ["arguments", "parameters", "args", "input"] {
        if let Some(value) = object.remove(key) {
            return RawArguments::Json(value);
        }
    }
    if object.is_empty() {
        RawArguments::Missing
    } else {
        RawArguments::Json(Value::Object(object))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        pocketcall_protocol::{ParamSchema, ParamType, ParsedOutcome},
        serde_json::json,
    };

    fn tools() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new("GetLocation", "Current device location"),
            ToolDescriptor::new("GetWeather", "Weather")
                .with_param(ParamSchema::new("latitude", ParamType::Number, true))
                .with_param(ParamSchema::new("longitude", ParamType::Number, true)),
        ]
    }

    #[test]
    fn schema_is_delegated_to_runtime() {
        assert_eq!(NativeDialect.compile_schema(&tools()), "");
    }

    #[test]
    fn bare_marker_without_arguments() {
        let outcomes = NativeDialect.parse(r#"{"tool":"GetLocation"}"#, &tools(), &[]);
        assert_eq!(outcomes, vec![ParsedOutcome::ToolInvocation {
            name: "GetLocation".into(),
            arguments: json!({}),
        }]);
    }

    #[test]
    fn marker_embedded_in_prose_with_arguments() {
        let text = r#"Sure, checking: {"tool": "GetWeather", "arguments": {"latitude": "40.4", "longitude": -3.7}} one moment."#;
        let outcomes = NativeDialect.parse(text, &tools(), &[]);
        assert_eq!(outcomes, vec![ParsedOutcome::ToolInvocation {
            name: "GetWeather".into(),
            arguments: json!({"latitude": 40.4, "longitude": -3.7}),
        }]);
    }

    #[test]
    fn flat_arguments_next_to_tool_key() {
        let text = r#"{"tool": "GetWeather", "latitude": 1.5, "longitude": 2.5}"#;
        let outcomes = NativeDialect.parse(text, &tools(), &[]);
        assert_eq!(outcomes, vec![ParsedOutcome::ToolInvocation {
            name: "GetWeather".into(),
            arguments: json!({"latitude": 1.5, "longitude": 2.5}),
        }]);
    }

    #[test]
    fn only_first_marker_is_taken() {
        let text = r#"{"tool": "GetLocation"} {"tool": "GetWeather"}"#;
        let outcomes = NativeDialect.parse(text, &tools(), &[]);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], ParsedOutcome::ToolInvocation { ref name, .. } if name == "GetLocation"));
    }

    #[test]
    fn truncated_object_is_repaired() {
        let outcomes = NativeDialect.parse(r#"{"tool": "GetLocation", "arguments": {"#, &tools(), &[]);
        assert_eq!(outcomes, vec![ParsedOutcome::ToolInvocation {
            name: "GetLocation".into(),
            arguments: json!({}),
        }]);
    }

    #[test]
    fn tool_key_after_nested_arguments() {
        let text = r#"{"arguments": {"latitude": 48.85, "longitude": 2.35}, "tool": "GetWeather"}"#;
        let outcomes = NativeDialect.parse(text, &tools(), &[]);
        assert_eq!(outcomes, vec![ParsedOutcome::ToolInvocation {
            name: "GetWeather".into(),
            arguments: json!({"latitude": 48.85, "longitude": 2.35}),
        }]);
    }

    #[test]
    fn nested_tool_key_inside_arguments_is_not_the_marker() {
        let text = r#"{"tool": "GetLocation", "arguments": {"tool": "x"}}"#;
        let outcomes = NativeDialect.parse(text, &tools(), &[]);
        assert!(matches!(outcomes[0], ParsedOutcome::ToolInvocation { ref name, .. } if name == "GetLocation"));
    }

    #[test]
    fn tool_key_with_non_string_value_is_text() {
        let text = r#"{"tool": 3}"#;
        let outcomes = NativeDialect.parse(text, &tools(), &[]);
        assert_eq!(outcomes, vec![ParsedOutcome::text_answer(text)]);
    }

    #[test]
    fn renders_tool_call_as_marker() {
        let rendered = NativeDialect
            .render_message(&ConversationMessage::ToolCall {
                id: "x".into(),
                name: "GetLocation".into(),
                arguments: json!({}),
            })
            .unwrap();
        let v: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(v["tool"], "GetLocation");
    }
}
