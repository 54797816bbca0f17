//! Request and response shapes at the agent boundary.

use serde::{Deserialize, Serialize};

use crate::types::{AgentToolCall, ContentPart, FinishReason, ModelMessage, Role, Usage};

/// Input to one agent invocation.
#[derive(Debug, Clone, Default)]
pub struct AgentRequest {
    /// Fixed system instruction, sent ahead of the conversation.
    pub instructions: Option<String>,
    /// Replayed history followed by the new user turn, oldest first.
    pub conversation: Vec<ModelMessage>,
}

impl AgentRequest {
    pub fn new(conversation: Vec<ModelMessage>) -> Self {
        Self {
            instructions: None,
            conversation,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// Metadata attached to a model-authored message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub model: String,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// One role-tagged message in an agent response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum AgentMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<AgentToolCall>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<ResponseMetadata>,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        structured: Option<serde_json::Value>,
        #[serde(default)]
        is_error: bool,
    },
}

impl AgentMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
            metadata: None,
        }
    }

    /// Convert a conversation message into its response-side form.
    pub fn from_model_message(message: &ModelMessage) -> Self {
        match message.role {
            Role::System => Self::System {
                content: message.plain_text(),
            },
            Role::User => Self::User {
                content: message.plain_text(),
            },
            Role::Assistant => Self::Assistant {
                content: message.plain_text(),
                tool_calls: message.tool_calls().into_iter().cloned().collect(),
                metadata: None,
            },
            Role::Tool => {
                let result = message.content.iter().find_map(|part| match part {
                    ContentPart::ToolResult(r) => Some(r),
                    _ => None,
                });
                match result {
                    Some(r) => Self::ToolResult {
                        tool_call_id: r.tool_call_id.clone(),
                        tool_name: String::new(),
                        content: r.result.to_string(),
                        structured: Some(r.result.clone()),
                        is_error: r.is_error,
                    },
                    None => Self::ToolResult {
                        tool_call_id: String::new(),
                        tool_name: String::new(),
                        content: message.plain_text(),
                        structured: None,
                        is_error: false,
                    },
                }
            }
        }
    }
}

/// Transcript of one invocation: the replayed input followed by what the
/// agent generated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub messages: Vec<AgentMessage>,
    /// Index of the first generated message; everything before it was input.
    #[serde(default)]
    pub generated_from: usize,
}

impl AgentResponse {
    /// A transcript made entirely of generated messages.
    pub fn new(messages: Vec<AgentMessage>) -> Self {
        Self {
            messages,
            generated_from: 0,
        }
    }

    /// A transcript whose first `input_len` messages replay the request.
    pub fn with_input(messages: Vec<AgentMessage>, input_len: usize) -> Self {
        let generated_from = input_len.min(messages.len());
        Self {
            messages,
            generated_from,
        }
    }

    /// Messages produced by this invocation, in arrival order.
    pub fn generated(&self) -> &[AgentMessage] {
        self.messages.get(self.generated_from..).unwrap_or_default()
    }

    /// Last non-empty assistant content generated by this invocation.
    pub fn final_text(&self) -> Option<&str> {
        self.generated().iter().rev().find_map(|m| match m {
            AgentMessage::Assistant { content, .. } if !content.trim().is_empty() => {
                Some(content.as_str())
            }
            _ => None,
        })
    }
}
