//! Diagnostic data pulled out of an agent response.
//!
//! Extraction never fails: absent fields come back as `None` or zero.

use serde::Serialize;
use tracing::info;

use crate::types::{Cost, Usage};

use super::response::{AgentMessage, AgentResponse};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenCounts {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

impl From<Usage> for TokenCounts {
    fn from(usage: Usage) -> Self {
        Self {
            prompt: usage.input_tokens,
            completion: usage.output_tokens,
            total: usage.total_tokens,
        }
    }
}

impl From<TokenCounts> for Usage {
    fn from(tokens: TokenCounts) -> Self {
        Self {
            input_tokens: tokens.prompt,
            output_tokens: tokens.completion,
            total_tokens: tokens.total,
        }
    }
}

/// Delivery details reported by a messaging tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub messaging_product: Option<String>,
    pub recipient: Option<String>,
    pub message_id: Option<String>,
}

impl DeliveryReceipt {
    /// Read a receipt from a tool result payload.
    ///
    /// Understands the Cloud API shape (`contacts[0].wa_id`,
    /// `messages[0].id`) and a flat `message_id`.
    pub fn from_payload(payload: &serde_json::Value) -> Self {
        let string_at = |pointer: &str| {
            payload
                .pointer(pointer)
                .and_then(|v| match v {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
        };

        Self {
            messaging_product: string_at("/messaging_product"),
            recipient: string_at("/contacts/0/wa_id"),
            message_id: string_at("/messages/0/id").or_else(|| string_at("/message_id")),
        }
    }
}

/// Everything worth logging about one agent run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentRunSummary {
    pub final_message: Option<String>,
    pub model: Option<String>,
    pub tool_used: Option<String>,
    pub tool_arguments: Option<serde_json::Value>,
    pub tool_result: Option<serde_json::Value>,
    pub receipt: DeliveryReceipt,
    pub tokens: TokenCounts,
    pub cost: Cost,
    pub success: bool,
}

impl AgentRunSummary {
    pub fn log(&self, thread_id: &str) {
        info!(
            thread_id,
            model = self.model.as_deref().unwrap_or("unknown"),
            tool = self.tool_used.as_deref().unwrap_or("none"),
            tool_arguments = ?self.tool_arguments,
            messaging_product = ?self.receipt.messaging_product,
            recipient = ?self.receipt.recipient,
            message_id = ?self.receipt.message_id,
            prompt_tokens = self.tokens.prompt,
            completion_tokens = self.tokens.completion,
            total_tokens = self.tokens.total,
            cost_usd = self.cost.total_cost,
            success = self.success,
            final_message = self.final_message.as_deref().unwrap_or(""),
            "agent run summary"
        );
    }
}

/// Derive a run summary from a response.
pub fn extract_agent_data(response: &AgentResponse) -> AgentRunSummary {
    let final_message = response.final_text().map(str::to_string);

    let generated = response.generated();

    let last_metadata = generated.iter().rev().find_map(|m| match m {
        AgentMessage::Assistant { metadata, .. } => Some(metadata.as_ref()),
        _ => None,
    });
    let metadata = last_metadata.flatten();
    let model = metadata.map(|m| m.model.clone());
    let tokens = metadata.map(|m| TokenCounts::from(m.usage)).unwrap_or_default();

    let first_call = generated.iter().find_map(|m| match m {
        AgentMessage::Assistant { tool_calls, .. } => tool_calls.first(),
        _ => None,
    });

    // Only the first tool result counts, even when its payload is not structured.
    let tool_result = generated
        .iter()
        .find_map(|m| match m {
            AgentMessage::ToolResult {
                structured,
                content,
                ..
            } => Some((structured, content)),
            _ => None,
        })
        .and_then(|(structured, content)| {
            structured
                .clone()
                .or_else(|| serde_json::from_str::<serde_json::Value>(content).ok())
        })
        .filter(|v| v.is_object() || v.is_array());

    let receipt = tool_result
        .as_ref()
        .map(DeliveryReceipt::from_payload)
        .unwrap_or_default();
    let cost = Cost::estimate(model.as_deref().unwrap_or_default(), &tokens.into());

    AgentRunSummary {
        success: receipt.message_id.is_some(),
        final_message,
        model,
        tool_used: first_call.map(|c| c.name.clone()),
        tool_arguments: first_call.map(|c| c.arguments.clone()),
        tool_result,
        receipt,
        tokens,
        cost,
    }
}
