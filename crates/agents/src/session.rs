//! The stateful inference session the driver prompts.

use std::pin::Pin;

use {async_trait::async_trait, futures::Stream, pocketcall_protocol::ToolDescriptor};

use crate::Result;

/// Text chunks of one streamed response.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// An on-device model session that keeps its own conversation history.
///
/// One owner at a time: every method takes `&mut self`.
#[async_trait]
pub trait InferenceSession: Send {
    /// Single-shot generation. `None` means the runtime produced nothing.
    async fn prompt_once(&mut self, prompt: &str) -> Result<Option<String>>;

    async fn prompt_streaming(&mut self, prompt: &str) -> Result<TextStream>;

    /// Drop the runtime's conversation history.
    async fn reset_conversation(&mut self) -> Result<()>;

    /// Hand the tool set to the runtime and start a fresh conversation.
    /// Runtimes that do not take tools natively just reset.
    async fn set_tools_and_reset(&mut self, tools: &[ToolDescriptor]) -> Result<()>;
}
