//! Data model shared by the pocketcall dialect engine and test harness.
//!
//! Everything here is plain data: tool descriptors, typed conversation
//! history, parse outcomes and classified stream frames. The wire markers
//! small models are prompted to emit live in [`markers`].

use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

// ── Wire markers ─────────────────────────────────────────────────────────────

pub mod markers {
    /// Key of the bare JSON marker `{"tool":"NAME"}`.
    pub const JSON_TOOL_KEY: &str = "tool";

    pub const TOOLS_OPEN: &str = "<tools>";
    pub const TOOLS_CLOSE: &str = "</tools>";
    pub const TOOL_CALL_OPEN: &str = "<tool_call>";
    pub const TOOL_CALL_CLOSE: &str = "</tool_call>";
    pub const TOOL_RESPONSE_OPEN: &str = "<tool_response>";
    pub const TOOL_RESPONSE_CLOSE: &str = "</tool_response>";

    pub const ACTION_PREFIX: &str = "Action:";
    pub const OBSERVATION_PREFIX: &str = "Observation:";
    pub const FINAL_ANSWER_PREFIX: &str = "Final Answer:";
    pub const NO_PARAMETERS: &str = "no parameters";

    pub const FUNCTION_OPEN: &str = "<function>";
    pub const FUNCTION_CLOSE: &str = "</function>";
    pub const PARAMETERS_OPEN: &str = "<parameters>";
    pub const PARAMETERS_CLOSE: &str = "</parameters>";
    /// `<function>none</function>` means "answer without tools".
    pub const FUNCTION_NONE: &str = "none";

    pub const THINK_OPEN: &str = "<think>";
    pub const THINK_CLOSE: &str = "</think>";
    pub const THINKING_OPEN: &str = "<thinking>";
    pub const THINKING_CLOSE: &str = "</thinking>";
}

// ── Tool descriptors ─────────────────────────────────────────────────────────

/// Semantic type of a tool parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ParamType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// JSON Schema type name.
    #[must_use]
    pub fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl FromStr for ParamType {
    type Err = Infallible;

    /// Parse from a loose type name. Never fails - unknown names map to `String`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "number" | "float" | "double" | "decimal" | "real" => Self::Number,
            "integer" | "int" | "long" | "short" => Self::Integer,
            "boolean" | "bool" => Self::Boolean,
            "array" | "list" | "vec" => Self::Array,
            "object" | "dict" | "map" | "json" => Self::Object,
            _ => Self::String,
        })
    }
}

impl From<String> for ParamType {
    fn from(value: String) -> Self {
        let Ok(parsed) = value.parse::<Self>();
        parsed
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_type())
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSchema {
    pub name: String,
    #[serde(default, rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl ParamSchema {
    pub fn new(name: impl Into<String>, param_type: ParamType, required: bool) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: String::new(),
            required,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A worked example used by few-shot prompt compilers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExample {
    /// The user request that should trigger the tool.
    pub query: String,
    /// Arguments the model is expected to pass.
    #[serde(default = "empty_object")]
    pub arguments: serde_json::Value,
    /// What the tool returns in the example.
    pub observation: String,
    /// Final answer derived from the observation.
    pub answer: String,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// A capability exposed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParamSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<ToolExample>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            examples: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, param: ParamSchema) -> Self {
        self.parameters.push(param);
        self
    }

    #[must_use]
    pub fn with_example(mut self, example: ToolExample) -> Self {
        self.examples.push(example);
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamSchema> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// JSON Schema object for the parameter list.
    pub fn parameters_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        for param in &self.parameters {
            let mut prop = serde_json::Map::new();
            prop.insert("type".into(), param.param_type.json_type().into());
            if !param.description.is_empty() {
                prop.insert("description".into(), param.description.clone().into());
            }
            properties.insert(param.name.clone(), serde_json::Value::Object(prop));
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

// ── Dialects ─────────────────────────────────────────────────────────────────

/// The textual convention a model uses to express tool calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    /// Schema handled by the inference runtime; model answers with `{"tool":"NAME"}`.
    Native,
    /// `<tool_call>{...}</tool_call>` blocks.
    #[default]
    Xml,
    /// Reason-then-act natural language (`Action:` / `Final Answer:`).
    React,
    /// `<function>NAME</function><parameters>{...}</parameters>`.
    MinimalTag,
}

impl DialectKind {
    pub const ALL: [Self; 4] = [Self::Native, Self::Xml, Self::React, Self::MinimalTag];
}

impl FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "native" | "json" | "schema_free" => Ok(Self::Native),
            "xml" | "hermes" | "tool_call" => Ok(Self::Xml),
            "react" | "nl" | "natural_language" => Ok(Self::React),
            "minimal_tag" | "minimal" | "function" => Ok(Self::MinimalTag),
            other => Err(format!("unknown dialect: {other}")),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Native => "native",
            Self::Xml => "xml",
            Self::React => "react",
            Self::MinimalTag => "minimal_tag",
        })
    }
}

// ── Conversation ─────────────────────────────────────────────────────────────

/// One element of a typed conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ConversationMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        name: String,
        content: String,
    },
    Reasoning {
        content: String,
    },
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
        }
    }

    pub fn tool_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            name: name.into(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System { .. })
    }
}

// ── Parse outcomes ───────────────────────────────────────────────────────────

/// Result of parsing one model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParsedOutcome {
    ToolInvocation {
        name: String,
        arguments: serde_json::Value,
    },
    TextAnswer {
        content: String,
    },
    /// The model named a tool that is not registered.
    UnknownTool { name: String },
    /// The model asked for the tool whose result it was just given.
    LoopBreak { name: String, prior_result: String },
}

impl ParsedOutcome {
    pub fn text_answer(content: impl Into<String>) -> Self {
        Self::TextAnswer {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn is_tool_invocation(&self) -> bool {
        matches!(self, Self::ToolInvocation { .. })
    }

    /// The user-facing answer for every outcome that ends a turn.
    ///
    /// `UnknownTool` and `LoopBreak` render as text answers; `None` only for
    /// a tool invocation.
    pub fn answer_text(&self) -> Option<String> {
        match self {
            Self::ToolInvocation { .. } => None,
            Self::TextAnswer { content } => Some(content.clone()),
            Self::UnknownTool { name } => Some(format!(
                "Sorry, I can't do that: the tool `{name}` is not available to me."
            )),
            Self::LoopBreak { prior_result, .. } => Some(prior_result.clone()),
        }
    }
}

// ── Stream frames ────────────────────────────────────────────────────────────

/// Classification of a span of streamed model output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    #[default]
    Content,
    Thinking,
    ToolSpan,
}

/// One unit of classified streaming output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFrame {
    pub kind: FrameKind,
    /// Visible text added by this frame.
    pub chunk: String,
    /// Everything visible in the current span so far.
    pub accumulated: String,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("string", ParamType::String)]
    #[case("float", ParamType::Number)]
    #[case("Double", ParamType::Number)]
    #[case("int", ParamType::Integer)]
    #[case("bool", ParamType::Boolean)]
    #[case("list", ParamType::Array)]
    #[case("dict", ParamType::Object)]
    #[case("geo-point", ParamType::String)]
    fn param_type_parses_loosely(#[case] raw: &str, #[case] expected: ParamType) {
        assert_eq!(raw.parse::<ParamType>().unwrap(), expected);
    }

    #[test]
    fn param_schema_deserializes_unknown_type_as_string() {
        let p: ParamSchema =
            serde_json::from_value(serde_json::json!({"name": "city", "type": "place"})).unwrap();
        assert_eq!(p.param_type, ParamType::String);
        assert!(!p.required);
    }

    #[test]
    fn parameters_schema_lists_required() {
        let tool = ToolDescriptor::new("GetWeather", "Weather for a city")
            .with_param(ParamSchema::new("city", ParamType::String, true))
            .with_param(ParamSchema::new("days", ParamType::Integer, false));
        let schema = tool.parameters_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["days"]["type"], "integer");
        assert_eq!(schema["required"], serde_json::json!(["city"]));
    }

    #[rstest]
    #[case("xml", DialectKind::Xml)]
    #[case("hermes", DialectKind::Xml)]
    #[case("react", DialectKind::React)]
    #[case("minimal-tag", DialectKind::MinimalTag)]
    #[case("native", DialectKind::Native)]
    fn dialect_kind_from_str(#[case] raw: &str, #[case] expected: DialectKind) {
        assert_eq!(raw.parse::<DialectKind>().unwrap(), expected);
    }

    #[test]
    fn dialect_kind_rejects_unknown() {
        assert!("smoke-signals".parse::<DialectKind>().is_err());
    }

    #[test]
    fn conversation_message_is_role_tagged() {
        let msg = ConversationMessage::tool_result("GetLocation", "{\"lat\":1}");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "tool_result");
        assert_eq!(v["name"], "GetLocation");
    }

    #[test]
    fn answer_text_covers_terminal_outcomes() {
        let unknown = ParsedOutcome::UnknownTool {
            name: "GetWeather".into(),
        };
        assert!(unknown.answer_text().unwrap().contains("GetWeather"));

        let looped = ParsedOutcome::LoopBreak {
            name: "GetLocation".into(),
            prior_result: "Madrid".into(),
        };
        assert_eq!(looped.answer_text().as_deref(), Some("Madrid"));

        let call = ParsedOutcome::ToolInvocation {
            name: "GetLocation".into(),
            arguments: serde_json::json!({}),
        };
        assert!(call.answer_text().is_none());
    }
}
