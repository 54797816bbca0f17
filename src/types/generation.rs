//! Sampling knobs passed through to the model, and why a completion ended.

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Sampling settings for one completion request.
///
/// Unset fields are omitted from the wire body so the provider default applies.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize, Default)]
pub struct GenerationSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl GenerationSettings {
    /// Temperature pinned to zero, for repeatable tool selection.
    pub fn deterministic() -> Self {
        Self {
            temperature: Some(0.0),
            ..Self::default()
        }
    }

    /// Copy every set field into a JSON request body.
    pub fn write_into(&self, body: &mut serde_json::Map<String, serde_json::Value>) {
        if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(self) {
            body.extend(fields);
        }
    }
}

/// Why the model stopped producing output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

impl FinishReason {
    /// Parse the provider's `finish_reason` string; unknown values map to `None`.
    pub fn from_wire(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}
