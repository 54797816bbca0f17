//! OpenAI Chat Completions API provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::ParleyError;
use crate::types::*;
use crate::util::retry::RetryPolicy;

use super::http::{bearer_headers, build_client, status_to_error};
use super::{ModelProvider, ProviderRequest, ProviderResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, ParleyError> {
        Ok(Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: build_client(request_timeout)?,
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy used for retryable failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_request_body(&self, request: &ProviderRequest) -> serde_json::Value {
        let messages = request
            .messages
            .iter()
            .map(message_to_openai)
            .collect::<Vec<_>>();

        let mut body = serde_json::Map::new();
        body.insert("model".into(), self.model.clone().into());
        body.insert("messages".into(), messages.into());

        request.settings.write_into(&mut body);

        if let Some(ref tools) = request.tools {
            if !tools.is_empty() {
                let tool_defs: Vec<serde_json::Value> = tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect();
                body.insert("tools".into(), tool_defs.into());
            }
        }

        serde_json::Value::Object(body)
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<ProviderResponse, ParleyError> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let data: OpenAiChatResponse = resp.json().await?;
        parse_chat_response(data)
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate_text(
        &self,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, ParleyError> {
        let body = self.build_request_body(request);
        debug!(model = %self.model, messages = request.messages.len(), "OpenAI generate_text");
        self.retry.execute(|| self.send_once(&body)).await
    }
}

fn parse_chat_response(data: OpenAiChatResponse) -> Result<ProviderResponse, ParleyError> {
    let choice = data
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ParleyError::api(200, "No choices in OpenAI response"))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| AgentToolCall {
            id: tc.id,
            name: tc.function.name,
            arguments: serde_json::from_str(&tc.function.arguments)
                .unwrap_or(serde_json::Value::String(tc.function.arguments)),
        })
        .collect();

    let finish_reason = choice
        .finish_reason
        .as_deref()
        .and_then(FinishReason::from_wire);

    Ok(ProviderResponse {
        text: choice.message.content.unwrap_or_default(),
        usage: data
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default(),
        tool_calls,
        finish_reason,
        model: data.model,
    })
}

fn message_to_openai(msg: &ModelMessage) -> serde_json::Value {
    if let [ContentPart::ToolResult(tr)] = msg.content.as_slice() {
        let content = match &tr.result {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        return serde_json::json!({
            "role": "tool",
            "tool_call_id": tr.tool_call_id,
            "content": content,
        });
    }

    let role = msg.role.to_string();
    let text = msg.plain_text();
    let tool_calls = msg.tool_calls();
    if tool_calls.is_empty() {
        return serde_json::json!({ "role": role, "content": text });
    }

    let tc_json: Vec<serde_json::Value> = tool_calls
        .iter()
        .map(|tc| {
            serde_json::json!({
                "id": tc.id,
                "type": "function",
                "function": {
                    "name": tc.name,
                    "arguments": tc.arguments.to_string(),
                }
            })
        })
        .collect();
    serde_json::json!({
        "role": role,
        "content": if text.is_empty() { serde_json::Value::Null } else { serde_json::Value::String(text) },
        "tool_calls": tc_json,
    })
}

// OpenAI API response types (internal)

#[derive(Deserialize)]
struct OpenAiChatResponse {
    model: Option<String>,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunction,
}

#[derive(Deserialize)]
struct OpenAiFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
