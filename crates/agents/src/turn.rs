//! Full versus incremental prompts over a stateful inference session.
//!
//! The session keeps its own history but offers no way to re-inject
//! structured messages, so after the first exchange only the newest message
//! is sent, re-serialized in the active dialect's wire syntax.

use std::sync::Arc;

use {
    pocketcall_protocol::{ConversationMessage, ToolDescriptor},
    tracing::debug,
};

use crate::dialect::Dialect;

/// Per-session progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectState {
    pub is_first_turn: bool,
}

impl Default for DialectState {
    fn default() -> Self {
        Self {
            is_first_turn: true,
        }
    }
}

pub struct TurnManager {
    dialect: Arc<dyn Dialect>,
    state: DialectState,
    schema: String,
}

impl TurnManager {
    pub fn new(dialect: Arc<dyn Dialect>, tools: &[ToolDescriptor]) -> Self {
        let schema = dialect.compile_schema(tools);
        Self {
            dialect,
            state: DialectState::default(),
            schema,
        }
    }

    /// Recompile the schema for a new tool set. Implies a fresh conversation.
    pub fn set_tools(&mut self, tools: &[ToolDescriptor]) {
        self.schema = self.dialect.compile_schema(tools);
        self.reset();
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn is_first_turn(&self) -> bool {
        self.state.is_first_turn
    }

    pub fn state(&self) -> DialectState {
        self.state
    }

    /// Prompt for the next exchange, or `None` when `history` holds nothing
    /// to send.
    pub fn build_prompt(&self, history: &[ConversationMessage]) -> Option<String> {
        if self.state.is_first_turn {
            self.first_turn(history)
        } else {
            self.incremental(history)
        }
    }

    /// Record that a prompt was answered.
    pub fn complete_exchange(&mut self) {
        if self.state.is_first_turn {
            debug!(dialect = %self.dialect.kind(), "first exchange complete");
        }
        self.state.is_first_turn = false;
    }

    /// Explicit conversation reset; the next prompt carries the schema again.
    pub fn reset(&mut self) {
        self.state = DialectState::default();
    }

    fn first_turn(&self, history: &[ConversationMessage]) -> Option<String> {
        let system = history
            .iter()
            .filter_map(|m| match m {
                ConversationMessage::System { content } => Some(content.trim()),
                _ => None,
            })
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        let user = history.iter().find_map(|m| match m {
            ConversationMessage::User { content } => Some(content.as_str()),
            _ => None,
        })?;
        Some(self.dialect.first_turn_prompt(&system, &self.schema, user))
    }

    fn incremental(&self, history: &[ConversationMessage]) -> Option<String> {
        // Several results from one multi-call response go out together.
        let trailing_results: Vec<&ConversationMessage> = history
            .iter()
            .rev()
            .take_while(|m| matches!(m, ConversationMessage::ToolResult { .. }))
            .collect();
        if !trailing_results.is_empty() {
            let rendered: Vec<String> = trailing_results
                .into_iter()
                .rev()
                .filter_map(|m| self.dialect.render_message(m))
                .collect();
            return (!rendered.is_empty()).then(|| rendered.join("\n"));
        }

        history
            .iter()
            .rev()
            .filter(|m| {
                !matches!(
                    m,
                    ConversationMessage::System { .. } | ConversationMessage::Reasoning { .. }
                )
            })
            .find_map(|m| self.dialect.render_message(m))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::dialect::{MinimalTagDialect, ReactDialect, XmlDialect},
        serde_json::json,
    };

    fn tools() -> Vec<ToolDescriptor> {
        vec![ToolDescriptor::new("GetLocation", "Current device location")]
    }

    fn xml_manager() -> TurnManager {
        TurnManager::new(Arc::new(XmlDialect), &tools())
    }

    #[test]
    fn first_turn_has_system_schema_and_user() {
        let manager = xml_manager();
        let history = vec![
            ConversationMessage::system("You are helpful."),
            ConversationMessage::user("Where am I?"),
        ];
        let prompt = manager.build_prompt(&history).unwrap();
        assert!(prompt.starts_with("You are helpful.\n\n# Tools"));
        assert!(prompt.contains("<tools>"));
        assert!(prompt.ends_with("Where am I?"));
    }

    #[test]
    fn first_turn_needs_a_user_message() {
        let manager = xml_manager();
        assert!(manager.build_prompt(&[ConversationMessage::system("x")]).is_none());
    }

    #[test]
    fn incremental_sends_only_the_tool_response() {
        let mut manager = xml_manager();
        manager.complete_exchange();
        let history = vec![
            ConversationMessage::system("You are helpful."),
            ConversationMessage::user("Where am I?"),
            ConversationMessage::ToolCall {
                id: "call_1".into(),
                name: "GetLocation".into(),
                arguments: json!({}),
            },
            ConversationMessage::tool_result("GetLocation", "Madrid"),
        ];
        let prompt = manager.build_prompt(&history).unwrap();
        assert_eq!(prompt, "<tool_response>\nMadrid\n</tool_response>");
        assert!(!prompt.contains("<tools>"));
    }

    #[test]
    fn trailing_results_from_one_response_are_batched() {
        let mut manager = xml_manager();
        manager.complete_exchange();
        let history = vec![
            ConversationMessage::user("Weather here?"),
            ConversationMessage::tool_result("GetLocation", "Madrid"),
            ConversationMessage::tool_result("GetWeather", "sunny"),
        ];
        let prompt = manager.build_prompt(&history).unwrap();
        assert_eq!(
            prompt,
            "<tool_response>\nMadrid\n</tool_response>\n<tool_response>\nsunny\n</tool_response>"
        );
    }

    #[test]
    fn incremental_user_message_in_dialect_framing() {
        let mut manager = TurnManager::new(Arc::new(ReactDialect), &tools());
        manager.complete_exchange();
        let history = vec![
            ConversationMessage::user("Where am I?"),
            ConversationMessage::assistant("Madrid."),
            ConversationMessage::user("And the weather?"),
            ConversationMessage::Reasoning {
                content: "hmm".into(),
            },
        ];
        assert_eq!(
            manager.build_prompt(&history).unwrap(),
            "Question: And the weather?"
        );
    }

    #[test]
    fn flag_flips_once_and_resets_only_explicitly() {
        let mut manager = TurnManager::new(Arc::new(MinimalTagDialect), &tools());
        assert!(manager.is_first_turn());
        manager.complete_exchange();
        assert!(!manager.is_first_turn());
        manager.complete_exchange();
        assert!(!manager.is_first_turn());
        manager.reset();
        assert!(manager.is_first_turn());
    }

    #[test]
    fn set_tools_recompiles_and_resets() {
        let mut manager = xml_manager();
        manager.complete_exchange();
        manager.set_tools(&[]);
        assert!(manager.is_first_turn());
        assert_eq!(manager.schema(), "");
    }
}
