use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::model::ClientInfo;
use rmcp::service::{ClientInitializeError, ServiceExt};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;

use super::{MCPRunningService, MCPTransport};

/// Streamable-HTTP MCP transport (for remote MCP servers).
///
/// Every configured header is sent on each request, which is how bearer
/// tokens and endpoint-specific identifiers reach the server.
pub struct StreamableHttpTransport {
    url: String,
    headers: BTreeMap<String, String>,
}

impl StreamableHttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Add a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn header_map(&self) -> Result<HeaderMap, String> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| format!("invalid header name '{name}'"))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| format!("invalid value for header '{name}'"))?;
            map.insert(name, value);
        }
        Ok(map)
    }

    fn http_client(&self) -> Result<reqwest::Client, String> {
        reqwest::Client::builder()
            .default_headers(self.header_map()?)
            .build()
            .map_err(|error| error.to_string())
    }
}

#[async_trait]
impl MCPTransport for StreamableHttpTransport {
    async fn connect(
        &mut self,
        client_info: ClientInfo,
    ) -> Result<MCPRunningService, ClientInitializeError> {
        let client = self.http_client().map_err(|message| {
            ClientInitializeError::ConnectionClosed(format!("http client setup failed: {message}"))
        })?;
        let transport = StreamableHttpClientTransport::with_client(
            client,
            StreamableHttpClientTransportConfig::with_uri(self.url.clone()),
        );

        client_info.into_dyn().serve(transport).await
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
