//! Scriptable completion client for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use parley_core::{ParleyError, Result};

use crate::client::{
    CompletionClient, CompletionMessage, CompletionRequest, TokenStream, ToolCallRequest,
};

/// A completion client that replays a scripted queue of responses.
///
/// Each call to [`complete`](CompletionClient::complete) or
/// [`complete_stream`](CompletionClient::complete_stream) pops the next
/// scripted message; an exhausted script is an error. Requests are recorded
/// for later assertions.
pub struct MockCompletionClient {
    script: Mutex<VecDeque<CompletionMessage>>,
    requests: Mutex<Vec<CompletionRequest>>,
    fail_next: Mutex<bool>,
}

impl MockCompletionClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            fail_next: Mutex::new(false),
        }
    }

    /// Queue a plain-text reply.
    pub fn push_text(&self, content: impl Into<String>) {
        self.script.lock().unwrap().push_back(CompletionMessage {
            content: content.into(),
            tool_calls: Vec::new(),
        });
    }

    /// Queue a reply that requests the given tool calls.
    pub fn push_tool_calls(&self, calls: Vec<ToolCallRequest>) {
        self.script.lock().unwrap().push_back(CompletionMessage {
            content: String::new(),
            tool_calls: calls,
        });
    }

    /// Make the next call fail with an Llm error.
    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    /// Requests seen so far, in call order.
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: CompletionRequest) -> Result<CompletionMessage> {
        self.requests.lock().unwrap().push(request);
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(ParleyError::Llm("scripted failure".to_string()));
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ParleyError::Llm("mock script exhausted".to_string()))
    }
}

impl Default for MockCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionMessage> {
        self.next(request)
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<TokenStream> {
        let message = self.next(request)?;
        let (tx, rx) = mpsc::channel(16);

        // Split the scripted content into word deltas so buffering logic
        // downstream sees more than one chunk.
        tokio::spawn(async move {
            let content = message.content;
            let mut rest = content.as_str();
            while !rest.is_empty() {
                let cut = match rest.find(' ') {
                    Some(i) => i + 1,
                    None => rest.len(),
                };
                let (piece, tail) = rest.split_at(cut);
                if tx.send(Ok(piece.to_string())).await.is_err() {
                    return;
                }
                rest = tail;
            }
        });

        Ok(rx)
    }
}
