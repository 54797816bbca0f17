//! Conversational session: one thread bound to live tool servers and a model.
//!
//! A session moves `Unconnected -> Connected -> Closed`. Turns are written to
//! the store only after the agent call succeeded, user and assistant together;
//! a failed turn leaves history untouched and the session usable.

mod prompt;

pub use prompt::SYSTEM_PROMPT;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use chrono::Utc;
use strum::Display;
use tracing::{error, info, warn};

use crate::agent::agent::DEFAULT_INVOKE_TIMEOUT;
use crate::agent::{extract_agent_data, AgentCapability, AgentRequest, ToolLoopAgent};
use crate::config::ParleyConfig;
use crate::error::ParleyError;
use crate::history::{ConversationStore, ConversationTurn, JsonFileStore, TurnRole};
use crate::mcp::manager::ConnectionManager;
use crate::mcp::spec::ServerSpec;
use crate::provider::ModelProvider;
use crate::types::{GenerationSettings, ModelMessage};

/// Reply when the agent call exceeds its time bound.
pub const TIMEOUT_REPLY: &str = "⚠️ Request timed out. Please try again.";

/// Reply for any other failed turn.
pub const FAILURE_REPLY: &str = "Sorry, I encountered a technical issue. Please try again shortly.";

/// Number of stored turns replayed into each prompt.
pub const DEFAULT_HISTORY_WINDOW: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Unconnected,
    Connected,
    Closed,
}

#[derive(Debug, Clone, Builder)]
pub struct SessionOptions {
    #[builder(default = DEFAULT_HISTORY_WINDOW)]
    pub history_window: usize,
    /// Empty means no system instruction.
    #[builder(into, default = SYSTEM_PROMPT.to_string())]
    pub system_prompt: String,
    #[builder(default = DEFAULT_INVOKE_TIMEOUT)]
    pub invoke_timeout: Duration,
    #[builder(default = GenerationSettings::deterministic())]
    pub settings: GenerationSettings,
    /// Log an [`AgentRunSummary`](crate::agent::AgentRunSummary) per turn.
    #[builder(default)]
    pub debug: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

pub struct ConversationSession {
    thread_id: String,
    manager: ConnectionManager,
    provider: Arc<dyn ModelProvider>,
    store: Arc<dyn ConversationStore>,
    options: SessionOptions,
    agent: Option<ToolLoopAgent>,
    recent: VecDeque<ConversationTurn>,
    state: SessionState,
}

impl ConversationSession {
    /// Create an unconnected session and load the recent history tail.
    pub fn new(
        thread_id: impl Into<String>,
        manager: ConnectionManager,
        provider: Arc<dyn ModelProvider>,
        store: Arc<dyn ConversationStore>,
        options: SessionOptions,
    ) -> Result<Self, ParleyError> {
        let thread_id = thread_id.into();
        let recent: VecDeque<ConversationTurn> = store
            .load(&thread_id, Some(options.history_window))?
            .into();
        info!(thread_id = %thread_id, replayed = recent.len(), "session created");

        Ok(Self {
            thread_id,
            manager,
            provider,
            store,
            options,
            agent: None,
            recent,
            state: SessionState::Unconnected,
        })
    }

    /// Session wired to real MCP servers, the OpenAI provider, and the JSON
    /// history file named in `config`.
    pub fn from_config(
        config: &ParleyConfig,
        thread_id: impl Into<String>,
        servers: Vec<ServerSpec>,
    ) -> Result<Self, ParleyError> {
        let provider = Arc::new(config.openai_provider()?);
        let store = Arc::new(JsonFileStore::new(config.history_file.clone()));
        let options = SessionOptions::builder()
            .invoke_timeout(config.invoke_timeout())
            .debug(config.debug)
            .build();
        Self::new(
            thread_id,
            ConnectionManager::new(servers),
            provider,
            store,
            options,
        )
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// In-memory tail replayed into the next prompt, oldest first.
    pub fn recent_history(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.recent.iter()
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Connect every server and bind the discovered tools to the model.
    ///
    /// On failure everything opened so far is released and the error is
    /// returned; the session stays unconnected.
    pub async fn connect(&mut self) -> Result<(), ParleyError> {
        match self.state {
            SessionState::Connected => return Ok(()),
            SessionState::Closed => {
                return Err(ParleyError::InvalidState("session is closed".into()))
            }
            SessionState::Unconnected => {}
        }

        let tools = match self.manager.connect().await {
            Ok(tools) => tools,
            Err(e) => {
                error!(thread_id = %self.thread_id, error = %e, "connect failed");
                if let Err(release) = self.manager.close().await {
                    warn!(thread_id = %self.thread_id, error = %release, "release after failed connect");
                }
                return Err(e);
            }
        };

        info!(thread_id = %self.thread_id, tools = tools.len(), "session connected");
        self.agent = Some(
            ToolLoopAgent::new(self.provider.clone(), tools)
                .with_settings(self.options.settings.clone())
                .with_timeout(self.options.invoke_timeout)
                .with_thread_id(self.thread_id.clone()),
        );
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Send one user message and return the assistant's reply.
    ///
    /// Agent failures are answered with [`TIMEOUT_REPLY`] or
    /// [`FAILURE_REPLY`] and leave history untouched. Errors are returned
    /// only for misuse or when the history write fails.
    pub async fn invoke(&mut self, user_text: &str) -> Result<String, ParleyError> {
        let agent = match (&self.state, &self.agent) {
            (SessionState::Connected, Some(agent)) => agent,
            _ => {
                return Err(ParleyError::InvalidState(format!(
                    "invoke requires a connected session (state: {})",
                    self.state
                )))
            }
        };

        let started = Utc::now();
        let mut conversation: Vec<ModelMessage> = self
            .recent
            .iter()
            .map(ConversationTurn::to_model_message)
            .collect();
        conversation.push(ModelMessage::user(user_text));

        let mut request = AgentRequest::new(conversation);
        if !self.options.system_prompt.is_empty() {
            request = request.with_instructions(self.options.system_prompt.clone());
        }

        let response = match agent.invoke(request).await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!(thread_id = %self.thread_id, error = %e, "agent call timed out");
                return Ok(TIMEOUT_REPLY.to_string());
            }
            Err(e) => {
                error!(
                    thread_id = %self.thread_id,
                    category = %e.category(),
                    error = %e,
                    "agent call failed"
                );
                return Ok(FAILURE_REPLY.to_string());
            }
        };

        let Some(reply) = response.final_text().map(str::to_string) else {
            error!(thread_id = %self.thread_id, "agent returned no assistant text");
            return Ok(FAILURE_REPLY.to_string());
        };

        if self.options.debug {
            extract_agent_data(&response).log(&self.thread_id);
        }

        let finished = Utc::now().max(started);
        let turns = [
            ConversationTurn::new(TurnRole::User, user_text, started),
            ConversationTurn::new(TurnRole::Assistant, reply.clone(), finished),
        ];
        self.store.append(&self.thread_id, &turns)?;

        self.recent.extend(turns);
        while self.recent.len() > self.options.history_window {
            self.recent.pop_front();
        }
        Ok(reply)
    }

    /// Forget this thread's history, durable and in-memory.
    pub fn reset(&mut self) -> Result<(), ParleyError> {
        self.store.clear(&self.thread_id)?;
        self.recent.clear();
        info!(thread_id = %self.thread_id, "history reset");
        Ok(())
    }

    /// Release every server connection. Safe to call repeatedly.
    pub async fn close(&mut self) -> Result<(), ParleyError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        self.agent = None;
        self.recent.clear();
        let result = self.manager.close().await;
        info!(thread_id = %self.thread_id, "session closed");
        result
    }
}

impl std::fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSession")
            .field("thread_id", &self.thread_id)
            .field("state", &self.state)
            .field("recent", &self.recent.len())
            .field("manager", &self.manager)
            .finish()
    }
}
