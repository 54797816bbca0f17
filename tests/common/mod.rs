//! Shared test helpers: a scripted model provider and an in-process MCP
//! connector that records every open and close.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use parley::error::ParleyError;
use parley::mcp::{MCPToolCallResult, MCPToolSchema, ServerConnection, ServerConnector, ServerSpec};
use parley::provider::{ModelProvider, ProviderRequest, ProviderResponse};
use parley::types::*;

/// Provider that replays queued outcomes in order.
pub struct MockProvider {
    model_id: String,
    outcomes: Mutex<VecDeque<Result<ProviderResponse, ParleyError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl MockProvider {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            outcomes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a text response.
    pub fn queue_response(&self, text: &str) {
        self.outcomes.lock().unwrap().push_back(Ok(ProviderResponse {
            text: text.to_string(),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 20,
                total_tokens: 30,
            },
            tool_calls: vec![],
            finish_reason: Some(FinishReason::Stop),
            model: Some(self.model_id.clone()),
        }));
    }

    /// Queue a tool call response.
    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) {
        self.outcomes.lock().unwrap().push_back(Ok(ProviderResponse {
            text: String::new(),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
            },
            tool_calls: vec![AgentToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: args,
            }],
            finish_reason: Some(FinishReason::ToolCalls),
            model: Some(self.model_id.clone()),
        }));
    }

    /// Queue a failure.
    pub fn queue_error(&self, error: ParleyError) {
        self.outcomes.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate_text(
        &self,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, ParleyError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.outcomes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(ParleyError::Stream("mock provider script exhausted".into())))
    }
}

/// How a mock server behaves.
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    pub tools: Vec<String>,
    pub fail_open: bool,
    pub fail_close: bool,
    pub reply: Option<serde_json::Value>,
}

impl MockServer {
    pub fn with_tools(tools: &[&str]) -> Self {
        Self {
            tools: tools.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn replying(mut self, reply: serde_json::Value) -> Self {
        self.reply = Some(reply);
        self
    }
}

/// Shared record of what the connector did.
#[derive(Debug, Default)]
pub struct ConnectorLog {
    pub opened: Vec<String>,
    pub closed: Vec<String>,
    pub calls: Vec<(String, serde_json::Value)>,
}

impl ConnectorLog {
    /// Servers opened but never closed.
    pub fn leaked(&self) -> Vec<String> {
        let mut open = self.opened.clone();
        for name in &self.closed {
            if let Some(pos) = open.iter().position(|o| o == name) {
                open.remove(pos);
            }
        }
        open
    }
}

pub struct MockConnector {
    servers: HashMap<String, MockServer>,
    pub log: Arc<Mutex<ConnectorLog>>,
}

impl MockConnector {
    pub fn new(servers: &[(&str, MockServer)]) -> Self {
        Self {
            servers: servers
                .iter()
                .map(|(name, server)| (name.to_string(), server.clone()))
                .collect(),
            log: Arc::new(Mutex::new(ConnectorLog::default())),
        }
    }
}

#[async_trait]
impl ServerConnector for MockConnector {
    async fn open(&self, spec: &ServerSpec) -> Result<Box<dyn ServerConnection>, ParleyError> {
        let server = self.servers.get(&spec.name).cloned().unwrap_or_default();
        if server.fail_open {
            return Err(ParleyError::connection(&spec.name, "handshake refused"));
        }
        self.log.lock().unwrap().opened.push(spec.name.clone());
        Ok(Box::new(MockConnection {
            name: spec.name.clone(),
            server,
            log: self.log.clone(),
            closed: false,
        }))
    }
}

struct MockConnection {
    name: String,
    server: MockServer,
    log: Arc<Mutex<ConnectorLog>>,
    closed: bool,
}

#[async_trait]
impl ServerConnection for MockConnection {
    async fn list_tools(&mut self) -> Result<Vec<MCPToolSchema>, ParleyError> {
        Ok(self
            .server
            .tools
            .iter()
            .map(|name| MCPToolSchema {
                name: name.clone(),
                description: Some(format!("{name} on {}", self.name)),
                input_schema: serde_json::json!({"type": "object"}),
            })
            .collect())
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<MCPToolCallResult, ParleyError> {
        self.log
            .lock()
            .unwrap()
            .calls
            .push((format!("{}/{name}", self.name), arguments));
        Ok(MCPToolCallResult {
            structured_content: self.server.reply.clone(),
            text_content: Some(format!("{name} ok")),
            content: Vec::new(),
        })
    }

    async fn close(&mut self) -> Result<(), ParleyError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.log.lock().unwrap().closed.push(self.name.clone());
        if self.server.fail_close {
            return Err(ParleyError::Stream(format!("{} did not shut down", self.name)));
        }
        Ok(())
    }
}

pub fn http_spec(name: &str) -> ServerSpec {
    ServerSpec::http(name, format!("https://{name}.example.test/mcp"), Default::default())
}
