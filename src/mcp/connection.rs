//! Opening a live session to one tool server.

use async_trait::async_trait;
use tracing::debug;

use crate::error::ParleyError;

use super::client::{MCPClient, MCPToolCallResult};
use super::schema::MCPToolSchema;
use super::spec::{ServerSpec, ServerTransport};
use super::transport::{MCPTransport, StdioTransport, StreamableHttpTransport};

/// A handshaken session to one tool server.
#[async_trait]
pub trait ServerConnection: Send {
    async fn list_tools(&mut self) -> Result<Vec<MCPToolSchema>, ParleyError>;

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<MCPToolCallResult, ParleyError>;

    /// Release the session. Must be safe to call more than once.
    async fn close(&mut self) -> Result<(), ParleyError>;
}

#[async_trait]
impl ServerConnection for MCPClient {
    async fn list_tools(&mut self) -> Result<Vec<MCPToolSchema>, ParleyError> {
        MCPClient::list_tools(self).await
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<MCPToolCallResult, ParleyError> {
        MCPClient::call_tool(self, name, arguments).await
    }

    async fn close(&mut self) -> Result<(), ParleyError> {
        MCPClient::close(self).await
    }
}

/// Opens [`ServerConnection`]s from specs.
#[async_trait]
pub trait ServerConnector: Send + Sync {
    async fn open(&self, spec: &ServerSpec) -> Result<Box<dyn ServerConnection>, ParleyError>;
}

/// Connector backed by real MCP transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct McpConnector;

impl McpConnector {
    fn transport_for(spec: &ServerSpec) -> Result<Box<dyn MCPTransport>, ParleyError> {
        match &spec.transport {
            ServerTransport::Stdio { path, .. } => {
                let (command, args) = spec.launch_command().ok_or_else(|| {
                    ParleyError::Configuration(format!(
                        "server '{}' has no launch command",
                        spec.name
                    ))
                })?;
                let mut transport = StdioTransport::new(command, args);
                // Relative script paths already resolve from our own cwd.
                let script = std::path::Path::new(path);
                if let Some(parent) = script.parent().filter(|_| script.is_absolute()) {
                    transport = transport.in_dir(parent);
                }
                Ok(Box::new(transport))
            }
            ServerTransport::Http { url, headers } => Ok(Box::new(
                StreamableHttpTransport::new(url.clone()).headers(headers.clone()),
            )),
        }
    }
}

#[async_trait]
impl ServerConnector for McpConnector {
    async fn open(&self, spec: &ServerSpec) -> Result<Box<dyn ServerConnection>, ParleyError> {
        spec.validate()?;
        let transport = Self::transport_for(spec)?;
        debug!(server = %spec.name, target = %transport.describe(), "opening MCP session");

        let mut client = MCPClient::new(transport);
        if let Err(e) = client.initialize().await {
            let _ = client.close().await;
            return Err(ParleyError::connection(&spec.name, e.to_string()));
        }
        Ok(Box::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_surfaces_as_connection_error() {
        let spec = ServerSpec::stdio("local", "/definitely/not/here/server-bin", Vec::new());
        let err = McpConnector
            .open(&spec)
            .await
            .err()
            .expect("spawning a missing binary should fail");
        assert!(matches!(err, ParleyError::Connection { server, .. } if server == "local"));
    }

    #[tokio::test]
    async fn invalid_spec_is_rejected_before_connecting() {
        let spec = ServerSpec::http("remote", "ftp://example.invalid/mcp", Default::default());
        let err = McpConnector
            .open(&spec)
            .await
            .err()
            .expect("non-http url should be rejected");
        assert!(matches!(err, ParleyError::Configuration(_)));
    }
}
