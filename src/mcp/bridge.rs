//! Bridge MCP tools into the parley tool system.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::ParleyError;
use crate::tools::arguments::ToolArguments;
use crate::tools::dynamic::{DynamicTool, DynamicToolProvider};
use crate::tools::tool::ToolExecutionContext;
use crate::tools::types::AgentToolParameters;

use super::connection::ServerConnection;
use super::resource::Releasable;
use super::schema::MCPToolSchema;

/// Adapts one server connection to the DynamicToolProvider trait.
///
/// Calls on the same server are serialized through the connection lock.
pub struct MCPToolAdapter {
    server: String,
    connection: Mutex<Box<dyn ServerConnection>>,
}

impl MCPToolAdapter {
    pub fn new(server: impl Into<String>, connection: Box<dyn ServerConnection>) -> Self {
        Self {
            server: server.into(),
            connection: Mutex::new(connection),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }
}

#[async_trait]
impl DynamicToolProvider for MCPToolAdapter {
    fn provider_name(&self) -> &str {
        &self.server
    }

    async fn list_tools(&self) -> Result<Vec<DynamicTool>, ParleyError> {
        let mut connection = self.connection.lock().await;
        let tools = connection.list_tools().await?;
        Ok(tools.into_iter().map(map_mcp_tool_to_dynamic).collect())
    }

    async fn execute_tool(
        &self,
        name: &str,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, ParleyError> {
        tracing::debug!(
            server = %self.server,
            tool = name,
            thread_id = ctx.thread_id.as_deref().unwrap_or_default(),
            call_id = ctx.tool_call_id.as_deref().unwrap_or_default(),
            "forwarding tool call to MCP server"
        );
        let mut connection = self.connection.lock().await;
        let result = connection.call_tool(name, args.raw().clone()).await?;
        Ok(result.into_value_or_text())
    }
}

#[async_trait]
impl Releasable for MCPToolAdapter {
    fn label(&self) -> &str {
        &self.server
    }

    async fn release(&self) -> Result<(), ParleyError> {
        self.connection.lock().await.close().await
    }
}

fn map_mcp_tool_to_dynamic(tool: MCPToolSchema) -> DynamicTool {
    DynamicTool {
        name: tool.name,
        description: tool.description.unwrap_or_default(),
        parameters: AgentToolParameters::from_schema(tool.input_schema),
    }
}
