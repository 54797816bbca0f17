//! JSON Schema describing a tool's input.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentToolParameters {
    pub schema: serde_json::Value,
}

impl AgentToolParameters {
    /// Wrap a server-reported schema.
    ///
    /// Chat-completions function parameters must be an object schema, so a
    /// schema without `type` (or a non-object value) is coerced to one.
    pub fn from_schema(schema: serde_json::Value) -> Self {
        let schema = match schema {
            serde_json::Value::Object(mut map) => {
                map.entry("type").or_insert_with(|| "object".into());
                map.entry("properties")
                    .or_insert_with(|| serde_json::Value::Object(Default::default()));
                serde_json::Value::Object(map)
            }
            _ => return Self::empty(),
        };
        Self { schema }
    }

    /// A tool that takes no arguments.
    pub fn empty() -> Self {
        Self {
            schema: serde_json::json!({
                "type": "object",
                "properties": {},
            }),
        }
    }
}
