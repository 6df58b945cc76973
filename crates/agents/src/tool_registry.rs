//! Tool handlers and the registry the driver dispatches through.

use std::sync::Arc;

use {async_trait::async_trait, pocketcall_protocol::ToolDescriptor, serde_json::Value};

use crate::{Error, Result};

/// An executable tool.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    async fn execute(&self, arguments: Value) -> anyhow::Result<Value>;
}

/// Ordered set of tools with unique names.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn AgentTool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Names are unique within a registry.
    pub fn register(&mut self, tool: Arc<dyn AgentTool>) -> Result<()> {
        if self.get(tool.name()).is_some() {
            return Err(Error::DuplicateTool(tool.name().to_string()));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Render a tool's return value as the text fed back to the model.
pub fn render_tool_output(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
