//! Reqwest-based client for an OpenAI-compatible chat-completions API.
//!
//! Whole responses go through a plain JSON POST; streamed responses use the
//! provider's SSE wire format parsed with `eventsource-stream`.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use parley_core::{ParleyError, Result};

use crate::client::{
    ChatMessage, CompletionClient, CompletionMessage, CompletionRequest, TokenStream,
    ToolCallRequest,
};

/// Channel depth for streamed token deltas.
const STREAM_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
}

#[derive(Deserialize)]
struct WireStreamChoice {
    delta: WireDelta,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

fn to_wire(msg: &ChatMessage) -> WireMessage {
    WireMessage {
        role: msg.role.as_str().to_string(),
        content: Some(msg.content.clone()),
        tool_calls: msg.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|c| WireToolCall {
                    id: c.id.clone(),
                    kind: "function".to_string(),
                    function: WireFunction {
                        name: c.name.clone(),
                        arguments: c.arguments.clone(),
                    },
                })
                .collect()
        }),
        tool_call_id: msg.tool_call_id.clone(),
    }
}

// =============================================================================
// Client
// =============================================================================

/// OpenAI-compatible chat-completions client.
pub struct OpenAiClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            http: reqwest::Client::new(),
        }
    }

    fn build_body<'a>(&'a self, request: &CompletionRequest, stream: bool) -> WireRequest<'a> {
        WireRequest {
            model: &self.model,
            messages: request.messages.iter().map(to_wire).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            // Streamed calls are synthesis-only; tools go on whole calls.
            tools: if stream { Vec::new() } else { request.tools.clone() },
            tool_choice: if !stream && !request.tools.is_empty() {
                Some("auto")
            } else {
                None
            },
            stream,
        }
    }

    async fn post(&self, body: &WireRequest<'_>) -> Result<reqwest::Response> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut req = self.http.post(&url).json(body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ParleyError::Llm(format!("completion request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ParleyError::Llm(format!(
                "completion API error {}: {}",
                status, body_text
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionMessage> {
        let body = self.build_body(&request, false);
        let response = self.post(&body).await?;

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| ParleyError::Llm(format!("failed to parse completion: {}", e)))?;

        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ParleyError::Llm("no choices in completion response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|c| ToolCallRequest {
                id: c.id,
                name: c.function.name,
                arguments: c.function.arguments,
            })
            .collect();

        Ok(CompletionMessage {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<TokenStream> {
        let body = self.build_body(&request, true);
        let response = self.post(&body).await?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut events = response.bytes_stream().eventsource();
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(error = %e, "Completion SSE stream error");
                        let _ = tx
                            .send(Err(ParleyError::Llm(format!("stream error: {}", e))))
                            .await;
                        return;
                    }
                };

                if event.data == "[DONE]" {
                    debug!("Completion stream finished");
                    return;
                }

                let chunk: WireStreamChunk = match serde_json::from_str(&event.data) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(error = %e, "Unparseable completion stream chunk");
                        continue;
                    }
                };

                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() && tx.send(Ok(content)).await.is_err() {
                            // Receiver dropped; stop reading the provider.
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::Role;

    fn sample_request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![
                ChatMessage::new(Role::System, "Be helpful."),
                ChatMessage::new(Role::User, "Hello"),
            ],
            tools: vec![serde_json::json!({"type": "function"})],
            temperature: 0.3,
            max_tokens: Some(1000),
        }
    }

    #[test]
    fn test_whole_body_includes_tools_and_choice() {
        let client = OpenAiClient::new("https://api.example.com/", "gpt-4o-mini", None);
        let body = client.build_body(&sample_request(), false);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["tool_choice"], "auto");
        assert_eq!(json["tools"].as_array().unwrap().len(), 1);
        assert!(json.get("stream").is_none());
        assert_eq!(json["messages"].as_array().unwrap().len(), 2);
        assert_eq!(json["messages"][0]["role"], "system");
    }

    #[test]
    fn test_stream_body_drops_tools() {
        let client = OpenAiClient::new("https://api.example.com", "gpt-4o-mini", None);
        let body = client.build_body(&sample_request(), true);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["stream"], true);
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OpenAiClient::new("https://api.example.com///", "m", None);
        assert_eq!(client.base_url, "https://api.example.com");
    }

    #[test]
    fn test_tool_call_message_serialization() {
        let msg = ChatMessage {
            role: Role::Assistant,
            content: String::new(),
            tool_calls: Some(vec![ToolCallRequest {
                id: "call_9".to_string(),
                name: "get_bio".to_string(),
                arguments: "{\"subject\":\"Ada Lovelace\"}".to_string(),
            }]),
            tool_call_id: None,
        };
        let json = serde_json::to_value(to_wire(&msg)).unwrap();
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "get_bio");
    }

    #[test]
    fn test_response_parsing_with_tool_calls() {
        let raw = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "web_search", "arguments": "{\"query\":\"nifty now\"}"}
                    }]
                }
            }]
        }"#;
        let wire: WireResponse = serde_json::from_str(raw).unwrap();
        let msg = wire.choices.into_iter().next().unwrap().message;
        assert!(msg.content.is_none());
        let calls = msg.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "web_search");
    }

    #[test]
    fn test_stream_chunk_parsing() {
        let raw = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        let chunk: WireStreamChunk = serde_json::from_str(raw).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));

        let raw_empty = r#"{"choices":[{"delta":{}}]}"#;
        let chunk: WireStreamChunk = serde_json::from_str(raw_empty).unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
    }
}
