//! Convenience re-exports for common use.

pub use crate::agent::{extract_agent_data, AgentCapability, AgentResponse, ToolLoopAgent};
pub use crate::config::ParleyConfig;
pub use crate::error::{ParleyError, Result};
pub use crate::history::{ConversationStore, ConversationTurn, JsonFileStore, TurnRole};
pub use crate::mcp::{ConnectionManager, ServerRegistry, ServerSpec, ServerTransport};
pub use crate::provider::ModelProvider;
pub use crate::session::{ConversationSession, SessionOptions, SessionState};
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments};
pub use crate::types::{ContentPart, GenerationSettings, ModelMessage, Role, Usage};
