//! Model Context Protocol (MCP) servers: specs, transports, sessions, and the
//! bridge into the tool system.

pub mod bridge;
pub mod client;
pub mod connection;
pub mod manager;
pub mod resource;
pub mod schema;
pub mod spec;
pub mod transport;

pub use bridge::MCPToolAdapter;
pub use client::{MCPClient, MCPConnectionState, MCPToolCallResult};
pub use connection::{McpConnector, ServerConnection, ServerConnector};
pub use manager::ConnectionManager;
pub use resource::{Releasable, ResourceGroup};
pub use schema::MCPToolSchema;
pub use spec::{ServerRegistry, ServerSpec, ServerTransport, TransportKind};
pub use transport::{MCPTransport, StdioTransport, StreamableHttpTransport};
