//! Mock tool handlers bound to fixed responses.

use std::sync::Arc;

use {
    async_trait::async_trait,
    pocketcall_agents::{AgentTool, ToolRegistry},
    pocketcall_protocol::ToolDescriptor,
    serde_json::Value,
    tracing::debug,
};

use crate::{Result, ledger::CallLedger, suite::ToolSpec};

/// Returns the same value on every call and records each call.
pub struct MockTool {
    descriptor: ToolDescriptor,
    response: Value,
    ledger: CallLedger,
}

impl MockTool {
    pub fn new(descriptor: ToolDescriptor, response: Value, ledger: CallLedger) -> Self {
        Self {
            descriptor,
            response,
            ledger,
        }
    }

    pub fn from_spec(spec: &ToolSpec, ledger: &CallLedger) -> Self {
        Self::new(spec.descriptor.clone(), spec.response.clone(), ledger.clone())
    }
}

#[async_trait]
impl AgentTool for MockTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, arguments: Value) -> anyhow::Result<Value> {
        debug!(tool = %self.descriptor.name, %arguments, "mock tool called");
        self.ledger.record(&self.descriptor.name, &arguments);
        Ok(self.response.clone())
    }
}

/// Registry holding exactly the mocks for `specs`, all writing to `ledger`.
pub fn registry_for(specs: &[ToolSpec], ledger: &CallLedger) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for spec in specs {
        registry.register(Arc::new(MockTool::from_spec(spec, ledger)))?;
    }
    Ok(registry)
}
