//! Declarative test suites.
//!
//! ```json
//! {"tests": [{
//!   "id": "location_basic",
//!   "name": "Location lookup",
//!   "description": ["The model should call GetLocation."],
//!   "queries": [{"text": "Where am I?"}],
//!   "system_prompt": "You are a helpful assistant.",
//!   "parse_thinking_tags": true,
//!   "rules": [{"type": "tool_match", "name": "GetLocation"}],
//!   "tools": [{"name": "GetLocation", "description": "Device location",
//!              "response": "latitude 40.4168, longitude -3.7038"}]
//! }]}
//! ```

use std::path::Path;

use {
    pocketcall_protocol::ToolDescriptor,
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn find(&self, id: &str) -> Option<&TestCase> {
        self.tests.iter().find(|t| t.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Vec<String>,
    pub queries: Vec<Query>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub rules: Vec<ValidationRule>,
    #[serde(default)]
    pub parse_thinking_tags: bool,
    /// Mock tools available to this case only.
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A mock tool: its descriptor plus the fixed value every call returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(flatten)]
    pub descriptor: ToolDescriptor,
    pub response: Value,
}

/// A pass/fail predicate over the case's content and call ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationRule {
    NoToolCalls,
    ToolMatch {
        name: String,
    },
    ToolMatchAll {
        names: Vec<String>,
    },
    ToolArgsMatch {
        name: String,
        args: Map<String, Value>,
    },
    ToolCountMin {
        min: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    ResponseLengthMin {
        min: usize,
    },
    ChatValid,
}
