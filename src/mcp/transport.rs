//! MCP transport layer.

use async_trait::async_trait;
use rmcp::model::ClientInfo;
use rmcp::service::{ClientInitializeError, DynService, RoleClient, RunningService};

pub type DynClientService = Box<dyn DynService<RoleClient>>;
pub type MCPRunningService = RunningService<RoleClient, DynClientService>;

/// Transport capable of producing an initialized rmcp client session.
#[async_trait]
pub trait MCPTransport: Send {
    /// Open the underlying channel and run the MCP initialize handshake.
    async fn connect(
        &mut self,
        client_info: ClientInfo,
    ) -> Result<MCPRunningService, ClientInitializeError>;

    /// Short human-readable target, used in logs.
    fn describe(&self) -> String;
}

mod http;
mod stdio;

pub use http::StreamableHttpTransport;
pub use stdio::StdioTransport;
