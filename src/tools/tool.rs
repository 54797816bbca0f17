//! The [`Tool`] seam between the agent loop and whatever executes a call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::types::AgentToolParameters;
use crate::error::ParleyError;
use crate::provider::ToolDefinition;

/// Where a tool call came from.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutionContext {
    pub thread_id: Option<String>,
    pub tool_call_id: Option<String>,
}

impl ToolExecutionContext {
    /// Same conversation, scoped to one model-issued call.
    pub fn for_call(&self, tool_call_id: impl Into<String>) -> Self {
        Self {
            thread_id: self.thread_id.clone(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// An invocable capability the model may request by name.
///
/// The agent only borrows tools; the server connection behind a remote tool
/// is owned by the connection manager.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> &AgentToolParameters;

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, ParleyError>;

    /// The declaration advertised to the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters().schema.clone(),
        }
    }
}

type BoxedHandler = Arc<
    dyn Fn(
            ToolArguments,
            ToolExecutionContext,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ParleyError>> + Send>>
        + Send
        + Sync,
>;

/// In-process tool backed by an async closure.
#[derive(Clone)]
pub struct AgentTool {
    name: String,
    description: String,
    parameters: AgentToolParameters,
    handler: BoxedHandler,
}

impl AgentTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: AgentToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, ParleyError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, ParleyError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool").field("name", &self.name).finish()
    }
}
