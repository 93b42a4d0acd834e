//! Parley LLM crate - OpenAI-compatible chat-completions client.
//!
//! Defines the [`CompletionClient`] trait used by the orchestration engine,
//! a reqwest-based implementation with whole-response and token-streamed
//! modes, and a scriptable mock for tests.

pub mod client;
pub mod mock;
pub mod openai;

pub use client::{
    ChatMessage, CompletionClient, CompletionMessage, CompletionRequest, ToolCallRequest,
};
pub use mock::MockCompletionClient;
pub use openai::OpenAiClient;
