//! Uniform result type for tool invocations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one tool invocation.
///
/// Failures are carried by value: `error` is set and `payload` holds a
/// `{"error": ...}` object. Downstream code handles every tool through this
/// one shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Tool name as requested by the model.
    pub name: String,
    /// Id of the originating tool call.
    pub tool_call_id: String,
    /// Raw payload, or `{"error": ...}` when `error` is set.
    pub payload: Value,
    /// Short inline marker shown to the user before synthesis output.
    /// Empty for successful results; the model formats those itself.
    pub display: String,
    pub error: bool,
    pub elapsed_ms: u64,
}

impl ToolOutcome {
    pub fn success(
        name: impl Into<String>,
        tool_call_id: impl Into<String>,
        payload: Value,
        elapsed_ms: u64,
    ) -> Self {
        let name = name.into();
        let display = if payload_is_empty(&payload) {
            format!("**No results from {}.**\n\n", name)
        } else {
            String::new()
        };
        Self {
            name,
            tool_call_id: tool_call_id.into(),
            payload,
            display,
            error: false,
            elapsed_ms,
        }
    }

    pub fn failure(
        name: impl Into<String>,
        tool_call_id: impl Into<String>,
        message: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        let message = message.into();
        Self {
            name: name.into(),
            tool_call_id: tool_call_id.into(),
            payload: serde_json::json!({ "error": message }),
            display: format!("**Error:** {}\n\n", message),
            error: true,
            elapsed_ms,
        }
    }

    /// Payload stringified for the tool-role synthesis message.
    pub fn payload_string(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

fn payload_is_empty(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
