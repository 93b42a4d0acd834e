//! Completion client trait and request/response types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use parley_core::types::Role;
use parley_core::Result;

/// One message in a completion request.
///
/// `tool_calls` is set on the assistant message that requested tools;
/// `tool_call_id` is set on tool-role messages carrying a result back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Tool-role message carrying a stringified tool result.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Raw JSON argument object, exactly as the model produced it.
    pub arguments: String,
}

/// A chat-completions request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Tool schemas offered to the model (JSON per the function-calling
    /// convention). Empty means no tools.
    pub tools: Vec<serde_json::Value>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// The model's reply to a non-streamed completion.
#[derive(Debug, Clone, Default)]
pub struct CompletionMessage {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl CompletionMessage {
    pub fn requested_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Receiver of token deltas from a streamed completion.
///
/// The stream ends when the sender is dropped; an `Err` item reports a
/// mid-stream provider failure.
pub type TokenStream = mpsc::Receiver<Result<String>>;

/// Async client for an OpenAI-compatible chat-completions API.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// One whole-response completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionMessage>;

    /// A token-streamed completion. Tool schemas in the request are
    /// ignored by streamed calls; streaming is only used for synthesis.
    async fn complete_stream(&self, request: CompletionRequest) -> Result<TokenStream>;
}
