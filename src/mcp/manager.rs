//! Connection manager: opens every configured server, aggregates tools, and
//! owns the resulting sessions until close.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::ParleyError;
use crate::tools::dynamic::{DynamicToolAdapter, DynamicToolProvider};
use crate::tools::tool::Tool;

use super::bridge::MCPToolAdapter;
use super::connection::{McpConnector, ServerConnector};
use super::resource::ResourceGroup;
use super::spec::{validate_all, ServerSpec};

pub struct ConnectionManager {
    servers: Vec<ServerSpec>,
    connector: Arc<dyn ServerConnector>,
    resources: ResourceGroup,
    tools: Vec<Arc<dyn Tool>>,
}

impl ConnectionManager {
    /// Manager that reaches servers over real MCP transports.
    pub fn new(servers: Vec<ServerSpec>) -> Self {
        Self::with_connector(servers, Arc::new(McpConnector))
    }

    pub fn with_connector(servers: Vec<ServerSpec>, connector: Arc<dyn ServerConnector>) -> Self {
        Self {
            servers,
            connector,
            resources: ResourceGroup::new(),
            tools: Vec::new(),
        }
    }

    pub fn servers(&self) -> &[ServerSpec] {
        &self.servers
    }

    /// Tools aggregated by the last successful [`connect`](Self::connect).
    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    /// Number of sessions currently held open.
    pub fn open_connections(&self) -> usize {
        self.resources.len()
    }

    /// Open every server in order and collect the tools they expose.
    ///
    /// Specs are validated up front so nothing is opened for a bad registry.
    /// If server N fails, sessions 1..N stay tracked and are released by
    /// [`close`](Self::close); the error is returned as-is.
    pub async fn connect(&mut self) -> Result<Vec<Arc<dyn Tool>>, ParleyError> {
        if !self.resources.is_empty() {
            return Err(ParleyError::InvalidState(
                "connection manager is already connected".into(),
            ));
        }
        validate_all(&self.servers)?;

        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        let mut owners: HashMap<String, String> = HashMap::new();

        for spec in &self.servers {
            info!(server = %spec.name, transport = %spec.kind(), "connecting to MCP server");
            let connection = self.connector.open(spec).await?;

            let adapter = Arc::new(MCPToolAdapter::new(spec.name.clone(), connection));
            self.resources.track(adapter.clone());

            let discovered = adapter.list_tools().await.map_err(|e| match e {
                ParleyError::Connection { .. } => e,
                other => ParleyError::connection(&spec.name, other.to_string()),
            })?;
            info!(server = %spec.name, count = discovered.len(), "discovered MCP tools");

            let provider: Arc<dyn DynamicToolProvider> = adapter;
            for tool in discovered {
                if let Some(previous) = owners.insert(tool.name.clone(), spec.name.clone()) {
                    warn!(
                        tool = %tool.name,
                        shadowed = %previous,
                        server = %spec.name,
                        "tool name registered by more than one server; last one wins"
                    );
                }
                tools.push(Arc::new(DynamicToolAdapter::new(provider.clone(), tool)));
            }
        }

        if tools.is_empty() {
            return Err(ParleyError::NoToolsDiscovered {
                servers: self.servers.len(),
            });
        }

        self.tools = tools.clone();
        Ok(tools)
    }

    /// Release every open session, newest first. Safe to call repeatedly.
    pub async fn close(&mut self) -> Result<(), ParleyError> {
        self.tools.clear();
        if self.resources.is_empty() {
            return Ok(());
        }
        info!(count = self.resources.len(), "releasing MCP sessions");
        self.resources.release_all().await
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("servers", &self.servers)
            .field("resources", &self.resources)
            .field("tools", &self.tools.len())
            .finish()
    }
}
