//! Agent capability: a model provider bound to a tool set.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::ParleyError;
use crate::provider::{ModelProvider, ProviderRequest, ProviderResponse, ToolDefinition};
use crate::tools::arguments::ToolArguments;
use crate::tools::tool::{Tool, ToolExecutionContext};
use crate::types::*;
use crate::util::timeout::with_timeout;

use super::response::{AgentMessage, AgentRequest, AgentResponse, ResponseMetadata};

/// Maximum tool loop iterations to prevent infinite loops.
pub const MAX_TOOL_ITERATIONS: usize = 20;

/// Default bound on one whole invocation.
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(120);

/// Accepts a conversation and returns a structured response.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    async fn invoke(&self, request: AgentRequest) -> Result<AgentResponse, ParleyError>;
}

/// Runs the provider in a loop, executing requested tools and feeding the
/// results back until the model answers in plain text.
pub struct ToolLoopAgent {
    provider: Arc<dyn ModelProvider>,
    tools: Vec<Arc<dyn Tool>>,
    settings: GenerationSettings,
    timeout: Duration,
    context: ToolExecutionContext,
}

impl ToolLoopAgent {
    pub fn new(provider: Arc<dyn ModelProvider>, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            provider,
            tools,
            settings: GenerationSettings::default(),
            timeout: DEFAULT_INVOKE_TIMEOUT,
            context: ToolExecutionContext::default(),
        }
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.context.thread_id = Some(thread_id.into());
        self
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    /// Last registered tool with this name.
    fn resolve_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().rev().find(|t| t.name() == name)
    }

    /// One definition per tool name, keeping the last registration.
    fn tool_definitions(&self) -> Option<Vec<ToolDefinition>> {
        if self.tools.is_empty() {
            return None;
        }
        let mut seen = HashSet::new();
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .iter()
            .rev()
            .filter(|t| seen.insert(t.name().to_string()))
            .map(|t| t.definition())
            .collect();
        defs.reverse();
        Some(defs)
    }

    async fn execute_tool_call(&self, call: &AgentToolCall) -> AgentMessage {
        let started = Instant::now();
        info!(tool = %call.name, call_id = %call.id, "tool call started");

        let outcome = match self.resolve_tool(&call.name) {
            Some(tool) => {
                let args = ToolArguments::new(call.arguments.clone());
                tool.execute(&args, &self.context.for_call(&call.id)).await
            }
            None => Err(ParleyError::ToolExecution {
                tool_name: call.name.clone(),
                message: format!("Tool '{}' not found", call.name),
            }),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(value) => {
                info!(tool = %call.name, elapsed_ms, "tool call finished");
                let content = match &value {
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                let structured = match value {
                    serde_json::Value::String(_) | serde_json::Value::Null => None,
                    other => Some(other),
                };
                AgentMessage::ToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content,
                    structured,
                    is_error: false,
                }
            }
            Err(e) => {
                warn!(tool = %call.name, elapsed_ms, error = %e, "tool call failed");
                AgentMessage::ToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: serde_json::json!({ "error": e.to_string() }).to_string(),
                    structured: None,
                    is_error: true,
                }
            }
        }
    }

    fn metadata_for(&self, response: &ProviderResponse) -> ResponseMetadata {
        ResponseMetadata {
            model: response
                .model
                .clone()
                .unwrap_or_else(|| self.provider.model_id().to_string()),
            usage: response.usage,
            finish_reason: response.finish_reason,
        }
    }

    async fn run(&self, request: AgentRequest) -> Result<AgentResponse, ParleyError> {
        let mut messages: Vec<ModelMessage> = Vec::with_capacity(request.conversation.len() + 1);
        if let Some(instructions) = request.instructions {
            messages.push(ModelMessage::system(instructions));
        }
        messages.extend(request.conversation);

        let mut transcript: Vec<AgentMessage> =
            messages.iter().map(AgentMessage::from_model_message).collect();
        let input_len = transcript.len();
        let tool_defs = self.tool_definitions();

        for iteration in 0..MAX_TOOL_ITERATIONS {
            let provider_request = ProviderRequest {
                messages: messages.clone(),
                settings: self.settings.clone(),
                tools: tool_defs.clone(),
            };

            debug!(iteration, "agent: calling provider");
            let response = self.provider.generate_text(&provider_request).await?;
            let metadata = self.metadata_for(&response);

            transcript.push(AgentMessage::Assistant {
                content: response.text.clone(),
                tool_calls: response.tool_calls.clone(),
                metadata: Some(metadata),
            });

            if response.tool_calls.is_empty() {
                return Ok(AgentResponse::with_input(transcript, input_len));
            }

            let mut assistant_content: Vec<ContentPart> = Vec::new();
            if !response.text.is_empty() {
                assistant_content.push(ContentPart::Text {
                    text: response.text.clone(),
                });
            }
            for call in &response.tool_calls {
                assistant_content.push(ContentPart::ToolCall(call.clone()));
            }
            messages.push(ModelMessage {
                role: Role::Assistant,
                content: assistant_content,
                timestamp: Some(chrono::Utc::now()),
            });

            for call in &response.tool_calls {
                let result = self.execute_tool_call(call).await;
                if let AgentMessage::ToolResult {
                    tool_call_id,
                    content,
                    structured,
                    is_error,
                    ..
                } = &result
                {
                    let payload = structured
                        .clone()
                        .unwrap_or_else(|| serde_json::Value::String(content.clone()));
                    messages.push(ModelMessage::tool_result(
                        tool_call_id.clone(),
                        payload,
                        *is_error,
                    ));
                }
                transcript.push(result);
            }
        }

        warn!(
            max_iterations = MAX_TOOL_ITERATIONS,
            "agent: tool loop hit iteration limit"
        );
        Err(ParleyError::ToolLoopExhausted {
            iterations: MAX_TOOL_ITERATIONS,
        })
    }
}

#[async_trait]
impl AgentCapability for ToolLoopAgent {
    async fn invoke(&self, request: AgentRequest) -> Result<AgentResponse, ParleyError> {
        with_timeout(self.timeout, self.run(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::tools::{AgentTool, AgentToolParameters};

    struct ScriptedProvider {
        responses: Mutex<VecDeque<ProviderResponse>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ProviderResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        fn model_id(&self) -> &str {
            "scripted-model"
        }

        async fn generate_text(
            &self,
            request: &ProviderRequest,
        ) -> Result<ProviderResponse, ParleyError> {
            self.requests.lock().expect("lock").push(request.clone());
            self.responses
                .lock()
                .expect("lock")
                .pop_front()
                .ok_or_else(|| ParleyError::Stream("script exhausted".into()))
        }
    }

    fn text(text: &str) -> ProviderResponse {
        ProviderResponse {
            text: text.into(),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 2,
                total_tokens: 12,
            },
            tool_calls: Vec::new(),
            finish_reason: Some(FinishReason::Stop),
            model: None,
        }
    }

    fn call(name: &str, arguments: serde_json::Value) -> ProviderResponse {
        ProviderResponse {
            text: String::new(),
            usage: Usage::default(),
            tool_calls: vec![AgentToolCall {
                id: "call_1".into(),
                name: name.into(),
                arguments,
            }],
            finish_reason: Some(FinishReason::ToolCalls),
            model: Some("gpt-4o-mini".into()),
        }
    }

    fn tool(name: &str, reply: serde_json::Value) -> Arc<dyn Tool> {
        Arc::new(AgentTool::new(
            name,
            "test tool",
            AgentToolParameters::empty(),
            move |_args, _ctx| {
                let reply = reply.clone();
                async move { Ok(reply) }
            },
        ))
    }

    #[tokio::test]
    async fn plain_answer_returns_transcript_with_metadata() {
        let provider = Arc::new(ScriptedProvider::new(vec![text("hello")]));
        let agent = ToolLoopAgent::new(provider.clone(), Vec::new());

        let response = agent
            .invoke(AgentRequest::new(vec![ModelMessage::user("hi")]).with_instructions("sys"))
            .await
            .expect("invoke should succeed");

        assert_eq!(response.messages.len(), 3);
        assert_eq!(response.generated_from, 2);
        assert_eq!(response.final_text(), Some("hello"));
        match &response.messages[2] {
            AgentMessage::Assistant {
                metadata: Some(meta),
                ..
            } => {
                assert_eq!(meta.model, "scripted-model");
                assert_eq!(meta.usage.total_tokens, 12);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        let requests = provider.requests.lock().expect("lock");
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert!(requests[0].tools.is_none());
    }

    #[tokio::test]
    async fn executes_tool_and_feeds_result_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            call("send_message", json!({"to": "1555"})),
            text("sent"),
        ]));
        let agent = ToolLoopAgent::new(
            provider.clone(),
            vec![tool("send_message", json!({"message_id": "42"}))],
        );

        let response = agent
            .invoke(AgentRequest::new(vec![ModelMessage::user("send it")]))
            .await
            .expect("invoke should succeed");

        let structured = response.messages.iter().find_map(|m| match m {
            AgentMessage::ToolResult {
                tool_name,
                structured,
                ..
            } if tool_name == "send_message" => structured.clone(),
            _ => None,
        });
        assert_eq!(structured, Some(json!({"message_id": "42"})));
        assert_eq!(response.final_text(), Some("sent"));

        let requests = provider.requests.lock().expect("lock");
        let last = requests.last().expect("second request");
        assert_eq!(last.messages.last().map(|m| m.role), Some(Role::Tool));
    }

    #[tokio::test]
    async fn duplicate_tool_names_resolve_to_last_registered() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            call("lookup", json!({})),
            text("done"),
        ]));
        let agent = ToolLoopAgent::new(
            provider.clone(),
            vec![tool("lookup", json!("first")), tool("lookup", json!("second"))],
        );

        let response = agent
            .invoke(AgentRequest::new(vec![ModelMessage::user("go")]))
            .await
            .expect("invoke should succeed");

        let content = response.messages.iter().find_map(|m| match m {
            AgentMessage::ToolResult { content, .. } => Some(content.clone()),
            _ => None,
        });
        assert_eq!(content.as_deref(), Some("second"));
        let requests = provider.requests.lock().expect("lock");
        assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_result() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            call("missing", json!({})),
            text("sorry"),
        ]));
        let agent = ToolLoopAgent::new(provider, Vec::new());

        let response = agent
            .invoke(AgentRequest::new(vec![ModelMessage::user("go")]))
            .await
            .expect("invoke should succeed");

        assert!(response.messages.iter().any(|m| matches!(
            m,
            AgentMessage::ToolResult { is_error: true, content, .. } if content.contains("not found")
        )));
    }

    struct StalledProvider;

    #[async_trait]
    impl ModelProvider for StalledProvider {
        fn provider_name(&self) -> &str {
            "stalled"
        }

        fn model_id(&self) -> &str {
            "stalled"
        }

        async fn generate_text(
            &self,
            _request: &ProviderRequest,
        ) -> Result<ProviderResponse, ParleyError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(text("late"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn invocation_is_bounded_by_timeout() {
        let agent = ToolLoopAgent::new(Arc::new(StalledProvider), Vec::new())
            .with_timeout(Duration::from_secs(5));
        let err = agent
            .invoke(AgentRequest::new(vec![ModelMessage::user("hi")]))
            .await
            .expect_err("stalled provider should time out");
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn empty_answer_does_not_surface_replayed_history() {
        let provider = Arc::new(ScriptedProvider::new(vec![text("")]));
        let agent = ToolLoopAgent::new(provider, Vec::new());

        let response = agent
            .invoke(AgentRequest::new(vec![
                ModelMessage::user("earlier question"),
                ModelMessage::assistant("earlier answer"),
                ModelMessage::user("new question"),
            ]))
            .await
            .expect("invoke should succeed");

        assert_eq!(response.generated().len(), 1);
        assert_eq!(response.final_text(), None);
    }

    #[tokio::test]
    async fn endless_tool_calls_stop_at_iteration_limit() {
        let script = (0..MAX_TOOL_ITERATIONS)
            .map(|_| call("lookup", json!({})))
            .collect();
        let provider = Arc::new(ScriptedProvider::new(script));
        let agent = ToolLoopAgent::new(provider.clone(), vec![tool("lookup", json!({"ok": true}))]);

        let err = agent
            .invoke(AgentRequest::new(vec![ModelMessage::user("loop forever")]))
            .await
            .expect_err("loop without a final answer should fail");

        assert!(matches!(
            err,
            ParleyError::ToolLoopExhausted { iterations } if iterations == MAX_TOOL_ITERATIONS
        ));
        assert_eq!(provider.requests.lock().expect("lock").len(), MAX_TOOL_ITERATIONS);
    }
}
