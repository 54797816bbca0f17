//! Tools known only at runtime, enumerated from a remote provider.

use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext};
use super::types::AgentToolParameters;
use crate::error::ParleyError;

/// Descriptor for a tool a provider reported during discovery.
#[derive(Debug, Clone)]
pub struct DynamicTool {
    pub name: String,
    pub description: String,
    pub parameters: AgentToolParameters,
}

/// Something that can enumerate tools and execute them by name.
#[async_trait]
pub trait DynamicToolProvider: Send + Sync {
    /// Used to attribute tools in logs.
    fn provider_name(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<DynamicTool>, ParleyError>;

    async fn execute_tool(
        &self,
        name: &str,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, ParleyError>;
}

/// A discovered tool routed back through the provider that reported it.
///
/// Only borrows the provider; the connection behind it is released by its owner.
pub struct DynamicToolAdapter {
    provider: Arc<dyn DynamicToolProvider>,
    tool: DynamicTool,
}

impl DynamicToolAdapter {
    pub fn new(provider: Arc<dyn DynamicToolProvider>, tool: DynamicTool) -> Self {
        Self { provider, tool }
    }

    pub fn origin(&self) -> &str {
        self.provider.provider_name()
    }
}

impl std::fmt::Debug for DynamicToolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicToolAdapter")
            .field("origin", &self.origin())
            .field("tool", &self.tool.name)
            .finish()
    }
}

#[async_trait]
impl Tool for DynamicToolAdapter {
    fn name(&self) -> &str {
        &self.tool.name
    }

    fn description(&self) -> &str {
        &self.tool.description
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.tool.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, ParleyError> {
        self.provider.execute_tool(&self.tool.name, args, ctx).await
    }
}
