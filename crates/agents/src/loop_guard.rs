//! Refuse to re-dispatch a tool right after its own result came back.
//!
//! Small models often answer a tool result by calling the same tool again,
//! forever. When that happens the prior result already holds the answer, so
//! it is returned as text instead.

use pocketcall_protocol::ConversationMessage;

/// Result of the most recent tool round-trip, if it was for `tool`.
///
/// Scans `history` backwards to the latest `ToolResult`. A `User` message
/// ends the scan: a new question may legitimately reuse the tool.
pub fn repeated_result<'a>(history: &'a [ConversationMessage], tool: &str) -> Option<&'a str> {
    for message in history.iter().rev() {
        match message {
            ConversationMessage::ToolResult { name, content } => {
                return (name == tool).then_some(content.as_str());
            },
            ConversationMessage::User { .. } => return None,
            _ => {},
        }
    }
    None
}
