//! One MCP session: handshake, tool discovery, tool calls, shutdown.

use rmcp::model::{
    CallToolRequestParams, CallToolResult, ClientInfo, Content, JsonObject, ProtocolVersion,
    ResourceContents,
};
use rmcp::service::{ClientInitializeError, ServiceError};
use tracing::debug;

use crate::error::ParleyError;

use super::schema::MCPToolSchema;
use super::transport::{MCPRunningService, MCPTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MCPConnectionState {
    Disconnected,
    Initialized,
    Closed,
}

/// Decoded `tools/call` result.
#[derive(Debug, Clone)]
pub struct MCPToolCallResult {
    pub structured_content: Option<serde_json::Value>,
    pub text_content: Option<String>,
    pub content: Vec<serde_json::Value>,
}

impl MCPToolCallResult {
    /// Structured payload if the server sent one, else the joined text, else raw content.
    pub fn into_value_or_text(self) -> serde_json::Value {
        match (self.structured_content, self.text_content) {
            (Some(structured), _) => structured,
            (None, Some(text)) => serde_json::Value::String(text),
            (None, None) => serde_json::Value::Array(self.content),
        }
    }
}

/// Client side of a single MCP server session.
///
/// A dropped transport is reconnected once per request; after [`close`](Self::close)
/// the client refuses further use.
pub struct MCPClient {
    transport: Box<dyn MCPTransport>,
    session: Option<MCPRunningService>,
    state: MCPConnectionState,
}

impl MCPClient {
    pub fn new(transport: Box<dyn MCPTransport>) -> Self {
        Self {
            transport,
            session: None,
            state: MCPConnectionState::Disconnected,
        }
    }

    pub fn connection_state(&self) -> MCPConnectionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == MCPConnectionState::Initialized
    }

    /// Open the transport and run the initialize handshake.
    ///
    /// Servers that reject the newest protocol revision are retried on 2024-11-05.
    pub async fn initialize(&mut self) -> Result<(), ParleyError> {
        if self.state == MCPConnectionState::Closed {
            return Err(closed_error());
        }
        if self.session.as_ref().is_some_and(|s| !s.is_closed()) {
            return Ok(());
        }

        let session = match self.handshake(ProtocolVersion::LATEST).await {
            Err(error) if rejects_protocol_version(&error) => {
                debug!(target = %self.transport.describe(), "retrying MCP handshake on 2024-11-05");
                self.handshake(ProtocolVersion::V_2024_11_05).await
            }
            other => other,
        }
        .map_err(map_client_initialize_error)?;

        self.session = Some(session);
        self.state = MCPConnectionState::Initialized;
        Ok(())
    }

    pub async fn list_tools(&mut self) -> Result<Vec<MCPToolSchema>, ParleyError> {
        self.ensure_initialized()?;
        let mut reconnected = false;
        loop {
            match self.fetch_tools().await {
                Ok(tools) => return Ok(tools.into_iter().map(MCPToolSchema::from).collect()),
                Err(error) if !reconnected && is_transport_drop(&error) => {
                    self.reconnect().await?;
                    reconnected = true;
                }
                Err(error) => return Err(map_service_error("list_tools", error)),
            }
        }
    }

    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<MCPToolCallResult, ParleyError> {
        self.ensure_initialized()?;
        let arguments = coerce_tool_arguments(arguments)?;
        let mut reconnected = false;
        loop {
            match self.send_call(name, arguments.clone()).await {
                Ok(result) => return map_call_result(name, result),
                Err(error) if !reconnected && is_transport_drop(&error) => {
                    self.reconnect().await?;
                    reconnected = true;
                }
                Err(error) => return Err(map_service_error("call_tool", error)),
            }
        }
    }

    /// Cancel the session. Safe to call repeatedly.
    pub async fn close(&mut self) -> Result<(), ParleyError> {
        if self.state == MCPConnectionState::Closed {
            return Ok(());
        }
        self.state = MCPConnectionState::Closed;

        if let Some(session) = self.session.take() {
            let reason = session
                .cancel()
                .await
                .map_err(|e| ParleyError::Stream(format!("MCP session shutdown failed: {e}")))?;
            debug!(target = %self.transport.describe(), ?reason, "MCP session closed");
        }
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<(), ParleyError> {
        match self.state {
            MCPConnectionState::Initialized => Ok(()),
            MCPConnectionState::Closed => Err(closed_error()),
            MCPConnectionState::Disconnected => Err(ParleyError::InvalidState(
                "MCP client must be initialized first".into(),
            )),
        }
    }

    async fn handshake(
        &mut self,
        protocol_version: ProtocolVersion,
    ) -> Result<MCPRunningService, ClientInitializeError> {
        let info = ClientInfo {
            protocol_version,
            ..Default::default()
        };
        self.transport.connect(info).await
    }

    async fn reconnect(&mut self) -> Result<(), ParleyError> {
        debug!(target = %self.transport.describe(), "MCP transport dropped, reconnecting");
        if let Some(stale) = self.session.take() {
            let _ = stale.cancel().await;
        }
        self.state = MCPConnectionState::Disconnected;
        self.initialize().await
    }

    async fn fetch_tools(&mut self) -> Result<Vec<rmcp::model::Tool>, ServiceError> {
        let session = self.session.as_mut().ok_or(ServiceError::TransportClosed)?;
        match session.list_all_tools().await {
            // Some servers reject the cursor loop; fall back to the first page.
            Err(ServiceError::UnexpectedResponse) => {
                session.list_tools(None).await.map(|page| page.tools)
            }
            other => other,
        }
    }

    async fn send_call(
        &mut self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, ServiceError> {
        let session = self.session.as_mut().ok_or(ServiceError::TransportClosed)?;
        let params = CallToolRequestParams {
            meta: None,
            name: name.to_owned().into(),
            arguments,
            task: None,
        };
        session.call_tool(params).await
    }
}

fn closed_error() -> ParleyError {
    ParleyError::Stream("MCP session is closed".into())
}

fn is_transport_drop(error: &ServiceError) -> bool {
    matches!(
        error,
        ServiceError::TransportClosed | ServiceError::TransportSend(_)
    )
}

fn rejects_protocol_version(error: &ClientInitializeError) -> bool {
    let ClientInitializeError::JsonRpcError(error) = error else {
        return false;
    };
    let message = error.message.to_ascii_lowercase();
    message.contains("protocol") && message.contains("version")
}

/// Arguments arrive from the model as an object, a JSON string, or nothing.
fn coerce_tool_arguments(value: serde_json::Value) -> Result<Option<JsonObject>, ParleyError> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) => Ok(Some(map)),
        serde_json::Value::String(raw) if raw.trim().is_empty() => Ok(None),
        serde_json::Value::String(raw) => {
            let parsed = serde_json::from_str(raw.trim()).map_err(|e| {
                ParleyError::InvalidArgument(format!("MCP tool arguments must be valid JSON: {e}"))
            })?;
            coerce_tool_arguments(parsed)
        }
        other => Err(ParleyError::InvalidArgument(format!(
            "MCP tool arguments must be a JSON object; got {other}"
        ))),
    }
}

fn extract_text_content(content: &[Content]) -> Option<String> {
    let lines: Vec<&str> = content
        .iter()
        .filter_map(|item| {
            if let Some(text) = item.as_text() {
                return Some(text.text.as_str());
            }
            match &item.as_resource()?.resource {
                ResourceContents::TextResourceContents { text, .. } => Some(text.as_str()),
                _ => None,
            }
        })
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn map_call_result(name: &str, result: CallToolResult) -> Result<MCPToolCallResult, ParleyError> {
    let text_content = extract_text_content(&result.content);

    if result.is_error.unwrap_or(false) {
        let message = result
            .structured_content
            .as_ref()
            .map(ToString::to_string)
            .or(text_content)
            .unwrap_or_else(|| "MCP tool returned an error result".into());
        return Err(ParleyError::ToolExecution {
            tool_name: name.to_string(),
            message,
        });
    }

    Ok(MCPToolCallResult {
        content: result
            .content
            .iter()
            .filter_map(|item| serde_json::to_value(item).ok())
            .collect(),
        structured_content: result.structured_content,
        text_content,
    })
}

fn protocol_error(message: String) -> ParleyError {
    ParleyError::Provider {
        provider: "mcp".into(),
        message,
    }
}

pub(crate) fn map_client_initialize_error(error: ClientInitializeError) -> ParleyError {
    match error {
        ClientInitializeError::ConnectionClosed(context) => {
            ParleyError::Stream(format!("MCP initialize connection closed: {context}"))
        }
        ClientInitializeError::TransportError { error, context } => ParleyError::Stream(format!(
            "MCP initialize transport error ({context}): {error}"
        )),
        ClientInitializeError::Cancelled => ParleyError::Stream("MCP initialize cancelled".into()),
        ClientInitializeError::JsonRpcError(error) => protocol_error(format!(
            "MCP initialize JSON-RPC error {}: {}",
            error.code.0, error.message
        )),
        other => protocol_error(format!("MCP initialize error: {other}")),
    }
}

fn map_service_error(context: &str, error: ServiceError) -> ParleyError {
    match error {
        ServiceError::Timeout { timeout } => ParleyError::Timeout(timeout.as_millis() as u64),
        ServiceError::TransportClosed => {
            ParleyError::Stream(format!("{context}: MCP transport closed"))
        }
        ServiceError::TransportSend(error) => {
            ParleyError::Stream(format!("{context}: MCP transport send failed: {error}"))
        }
        ServiceError::Cancelled { reason } => ParleyError::Stream(format!(
            "{context}: MCP request cancelled{}",
            reason.map(|r| format!(" ({r})")).unwrap_or_default()
        )),
        ServiceError::McpError(error) => protocol_error(format!(
            "{context}: MCP error {}: {}",
            error.code.0, error.message
        )),
        other => protocol_error(format!("{context}: MCP service error: {other}")),
    }
}
