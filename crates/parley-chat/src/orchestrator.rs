//! Two-phase turn orchestration.
//!
//! Every turn runs: decision completion (tools offered, auto choice) ->
//! sequential tool execution -> synthesis completion, delivered whole or as
//! buffered chunks. Whole and streamed delivery assemble the identical
//! final response; streaming changes only granularity.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use parley_core::config::{HistoryConfig, LlmConfig, StreamConfig};
use parley_core::types::{ArchivedTurn, EndReason, Role, StoredMessage};
use parley_core::Result;
use parley_history::{ArchiveStore, HistoryStore};
use parley_llm::{CompletionClient, CompletionMessage, CompletionRequest};
use parley_tools::{tool_schemas, ToolInvocation, ToolOutcome, ToolRegistry};

use crate::buffer::ChunkBuffer;
use crate::context::{build_context, build_synthesis_context};
use crate::events::{ChatEvent, ChatEventStream};
use crate::prompts::{CASUAL_PROMPT, DECISION_PROMPT, EMPTY_RESPONSE_FALLBACK, SYNTHESIS_PROMPT};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Separator between tool result markers and the synthesized answer.
const RESULTS_SEPARATOR: &str = "\n\n\n";
/// Prefix used when tools ran but produced no visible markers.
const NO_RESULTS_PREFIX: &str = "\n\n";

#[derive(Clone)]
pub struct ChatOrchestrator {
    llm: Arc<dyn CompletionClient>,
    tools: Arc<ToolRegistry>,
    history: Arc<dyn HistoryStore>,
    archive: Arc<dyn ArchiveStore>,
    llm_config: LlmConfig,
    history_config: HistoryConfig,
    stream_config: StreamConfig,
}

/// State captured at the start of a turn: the appended user message's
/// sequence number and the history read for context.
struct TurnSetup {
    seq: i64,
    history: Vec<StoredMessage>,
}

impl ChatOrchestrator {
    pub fn new(
        llm: Arc<dyn CompletionClient>,
        tools: Arc<ToolRegistry>,
        history: Arc<dyn HistoryStore>,
        archive: Arc<dyn ArchiveStore>,
        llm_config: LlmConfig,
        history_config: HistoryConfig,
        stream_config: StreamConfig,
    ) -> Self {
        Self {
            llm,
            tools,
            history,
            archive,
            llm_config,
            history_config,
            stream_config,
        }
    }

    /// Append the user message, then read context history.
    ///
    /// The appended message's own sequence number excludes it from context,
    /// so the read can safely run after the append.
    async fn begin_turn(&self, session_id: &str, query: &str) -> Result<TurnSetup> {
        let seq = self.history.append(session_id, Role::User, query).await?;
        let history = self
            .history
            .read_recent(session_id, self.history_config.read_limit + 1)
            .await?;
        info!(
            session = session_id,
            seq,
            history = history.len(),
            "Turn started"
        );
        Ok(TurnSetup { seq, history })
    }

    async fn decide(&self, setup: &TurnSetup, query: &str) -> Result<CompletionMessage> {
        let messages = build_context(
            DECISION_PROMPT,
            &setup.history,
            query,
            setup.seq,
            self.history_config.context_limit,
        );
        self.llm
            .complete(CompletionRequest {
                messages,
                tools: tool_schemas(),
                temperature: self.llm_config.temperature,
                max_tokens: None,
            })
            .await
    }

    async fn run_tools(&self, decision: &CompletionMessage) -> Vec<ToolOutcome> {
        let invocations: Vec<ToolInvocation> = decision
            .tool_calls
            .iter()
            .map(|c| ToolInvocation {
                id: c.id.clone(),
                name: c.name.clone(),
                arguments: c.arguments.clone(),
            })
            .collect();
        self.tools.execute_all(&invocations).await
    }

    fn synthesis_request(
        &self,
        setup: &TurnSetup,
        query: &str,
        decision: &CompletionMessage,
        outcomes: &[ToolOutcome],
    ) -> CompletionRequest {
        let messages = build_synthesis_context(
            SYNTHESIS_PROMPT,
            &setup.history,
            query,
            setup.seq,
            &decision.content,
            &decision.tool_calls,
            outcomes,
            self.history_config.synthesis_history,
        );
        CompletionRequest {
            messages,
            tools: Vec::new(),
            temperature: self.llm_config.temperature,
            max_tokens: Some(self.llm_config.max_tokens),
        }
    }

    fn casual_request(&self, setup: &TurnSetup, query: &str) -> CompletionRequest {
        let messages = build_context(
            CASUAL_PROMPT,
            &setup.history,
            query,
            setup.seq,
            self.history_config.context_limit,
        );
        CompletionRequest {
            messages,
            tools: Vec::new(),
            temperature: self.llm_config.chat_temperature,
            max_tokens: Some(self.llm_config.max_tokens),
        }
    }

    /// Persist the completed turn to both stores, best effort.
    ///
    /// An empty assembled response is logged and deliberately not persisted.
    async fn persist_turn(&self, session_id: &str, query: &str, response: &str) {
        if response.trim().is_empty() {
            warn!(session = session_id, "Empty response generated, not persisting");
            return;
        }
        if let Err(e) = self
            .archive
            .record_turn(&ArchivedTurn {
                session_id: session_id.to_string(),
                user: query.to_string(),
                assistant: response.to_string(),
                timestamp: Utc::now(),
            })
            .await
        {
            error!(session = session_id, error = %e, "Failed to archive turn");
        }
        if let Err(e) = self
            .history
            .append(session_id, Role::Assistant, response)
            .await
        {
            error!(session = session_id, error = %e, "Failed to store assistant message");
        }
    }

    // =========================================================================
    // Whole-response turn
    // =========================================================================

    /// Run a whole turn and return the final response text.
    ///
    /// Store failures before the turn starts propagate; provider failures
    /// during the turn become the response text, which is persisted so the
    /// log stays consistent.
    pub async fn handle_query(&self, session_id: &str, query: &str) -> Result<String> {
        let setup = self.begin_turn(session_id, query).await?;

        let response = match self.run_whole_turn(&setup, query).await {
            Ok(text) => text,
            Err(e) => {
                error!(session = session_id, error = %e, "Turn failed");
                format!("Error processing request: {}", e)
            }
        };

        self.persist_turn(session_id, query, &response).await;
        Ok(response)
    }

    async fn run_whole_turn(&self, setup: &TurnSetup, query: &str) -> Result<String> {
        let decision = self.decide(setup, query).await?;

        if !decision.requested_tools() {
            info!("No tools requested, direct response");
            let content = decision.content.trim().to_string();
            return Ok(if content.is_empty() {
                EMPTY_RESPONSE_FALLBACK.to_string()
            } else {
                decision.content
            });
        }

        info!(count = decision.tool_calls.len(), "Tools requested");
        let outcomes = self.run_tools(&decision).await;
        let reply = self
            .llm
            .complete(self.synthesis_request(setup, query, &decision, &outcomes))
            .await?;
        Ok(assemble_response(&outcomes, &reply.content))
    }

    // =========================================================================
    // Streamed turn
    // =========================================================================

    /// Run a streamed turn. Store failures surface before any event is
    /// emitted; afterwards the channel carries text chunks and exactly one
    /// terminal [`ChatEvent::End`].
    pub async fn stream_query(&self, session_id: &str, query: &str) -> Result<ChatEventStream> {
        let setup = self.begin_turn(session_id, query).await?;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let this = self.clone();
        let session_id = session_id.to_string();
        let query = query.to_string();
        tokio::spawn(async move {
            this.run_streamed_turn(tx, &session_id, &query, setup).await;
        });
        Ok(rx)
    }

    async fn run_streamed_turn(
        &self,
        tx: mpsc::Sender<ChatEvent>,
        session_id: &str,
        query: &str,
        setup: TurnSetup,
    ) {
        let mut assembled = String::new();

        let reason = match self.stream_turn_inner(&tx, &setup, query, &mut assembled).await {
            Ok(true) => EndReason::Done,
            Ok(false) => {
                // Consumer went away; stop generating, persist nothing.
                info!(session = session_id, "Stream consumer disconnected");
                EndReason::Cancelled
            }
            Err(e) => {
                error!(session = session_id, error = %e, "Streamed turn failed");
                let message = format!("Streaming error: {}", e);
                let _ = tx.send(ChatEvent::Text(message.clone())).await;
                assembled = message;
                EndReason::Error
            }
        };

        if reason != EndReason::Cancelled {
            self.persist_turn(session_id, query, &assembled).await;
        }
        let _ = tx.send(ChatEvent::End(reason)).await;
    }

    /// Returns Ok(true) on completion, Ok(false) if the receiver dropped.
    async fn stream_turn_inner(
        &self,
        tx: &mpsc::Sender<ChatEvent>,
        setup: &TurnSetup,
        query: &str,
        assembled: &mut String,
    ) -> Result<bool> {
        let decision = self.decide(setup, query).await?;

        if !decision.requested_tools() {
            info!("No tools requested, streaming casual response");
            let tokens = self.llm.complete_stream(self.casual_request(setup, query)).await?;
            let buffer = ChunkBuffer::new(self.stream_config.min_flush_bytes);
            return self.pump_tokens(tx, tokens, buffer, assembled).await;
        }

        info!(count = decision.tool_calls.len(), "Tools requested, streaming");
        let mut seen = HashSet::new();
        let mut outcomes = Vec::new();
        for call in &decision.tool_calls {
            // Disconnect is polled between tool executions so no further
            // provider call starts for a dead consumer.
            if tx.is_closed() {
                return Ok(false);
            }
            if !seen.insert(call.name.clone()) {
                warn!(tool = %call.name, "Duplicate tool call skipped");
                continue;
            }
            outcomes.push(
                self.tools
                    .execute(&ToolInvocation {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    })
                    .await,
            );
        }

        // Emit error markers and the separator before synthesis so the
        // streamed bytes concatenate to the whole-mode response.
        let displays = joined_displays(&outcomes);
        if !displays.is_empty() {
            if !send_text(tx, assembled, displays).await {
                return Ok(false);
            }
            if !send_text(tx, assembled, RESULTS_SEPARATOR.to_string()).await {
                return Ok(false);
            }
        } else if !send_text(tx, assembled, NO_RESULTS_PREFIX.to_string()).await {
            return Ok(false);
        }

        let tokens = self
            .llm
            .complete_stream(self.synthesis_request(setup, query, &decision, &outcomes))
            .await?;
        let buffer = ChunkBuffer::new(self.stream_config.synthesis_flush_bytes);
        self.pump_tokens(tx, tokens, buffer, assembled).await
    }

    /// Forward buffered token deltas to the channel.
    async fn pump_tokens(
        &self,
        tx: &mpsc::Sender<ChatEvent>,
        mut tokens: parley_llm::client::TokenStream,
        mut buffer: ChunkBuffer,
        assembled: &mut String,
    ) -> Result<bool> {
        while let Some(delta) = tokens.recv().await {
            let delta = delta?;
            if let Some(flushed) = buffer.push(&delta) {
                if !send_text(tx, assembled, flushed).await {
                    return Ok(false);
                }
            }
        }
        if let Some(rest) = buffer.finish() {
            if !send_text(tx, assembled, rest).await {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Whole-mode response assembly. Streamed turns emit these exact pieces.
fn assemble_response(outcomes: &[ToolOutcome], synthesis: &str) -> String {
    let displays = joined_displays(outcomes);
    if displays.is_empty() {
        format!("{}{}", NO_RESULTS_PREFIX, synthesis)
    } else {
        format!("{}{}{}", displays, RESULTS_SEPARATOR, synthesis)
    }
}

fn joined_displays(outcomes: &[ToolOutcome]) -> String {
    let markers: Vec<&str> = outcomes
        .iter()
        .map(|o| o.display.as_str())
        .filter(|d| !d.trim().is_empty())
        .collect();
    markers.join("\n")
}

async fn send_text(
    tx: &mpsc::Sender<ChatEvent>,
    assembled: &mut String,
    text: String,
) -> bool {
    assembled.push_str(&text);
    tx.send(ChatEvent::Text(text)).await.is_ok()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::config::ToolsConfig;
    use parley_history::{MemoryArchiveStore, MemoryHistoryStore};
    use parley_llm::{MockCompletionClient, ToolCallRequest};
    use parley_tools::MockSearchProvider;

    struct Harness {
        orchestrator: ChatOrchestrator,
        llm: Arc<MockCompletionClient>,
        provider: Arc<MockSearchProvider>,
        history: Arc<MemoryHistoryStore>,
        archive: Arc<MemoryArchiveStore>,
    }

    fn harness() -> Harness {
        let llm = Arc::new(MockCompletionClient::new());
        let provider = Arc::new(MockSearchProvider::new());
        let history = Arc::new(MemoryHistoryStore::new());
        let archive = Arc::new(MemoryArchiveStore::new());
        let tools = Arc::new(ToolRegistry::new(
            Arc::clone(&provider) as Arc<dyn parley_tools::SearchProvider>,
            ToolsConfig::default(),
        ));
        let orchestrator = ChatOrchestrator::new(
            Arc::clone(&llm) as Arc<dyn CompletionClient>,
            tools,
            Arc::clone(&history) as Arc<dyn HistoryStore>,
            Arc::clone(&archive) as Arc<dyn ArchiveStore>,
            LlmConfig::default(),
            HistoryConfig::default(),
            StreamConfig::default(),
        );
        Harness {
            orchestrator,
            llm,
            provider,
            history,
            archive,
        }
    }

    fn bio_call(id: &str, subject: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: "get_bio".to_string(),
            arguments: format!(r#"{{"subject":"{}"}}"#, subject),
        }
    }

    async fn collect(mut rx: ChatEventStream) -> (String, EndReason) {
        let mut text = String::new();
        let mut reason = EndReason::Error;
        while let Some(event) = rx.recv().await {
            match event {
                ChatEvent::Text(t) => text.push_str(&t),
                ChatEvent::End(r) => reason = r,
            }
        }
        (text, reason)
    }

    // ---- whole-response turns ----

    #[tokio::test]
    async fn test_casual_turn_persists_once() {
        let h = harness();
        h.llm.push_text("Hello there.");

        let response = h.orchestrator.handle_query("s", "hi").await.unwrap();
        assert_eq!(response, "Hello there.");

        let stored = h.history.read_all("s", 50).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].role, Role::User);
        assert_eq!(stored[1].content, "Hello there.");

        let turns = h.archive.recorded_turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].user, "hi");
        assert_eq!(turns[0].assistant, "Hello there.");
    }

    #[tokio::test]
    async fn test_tool_turn_runs_two_phases() {
        let h = harness();
        h.provider.set_bio("Ada", "Ada: mathematician");
        h.llm.push_tool_calls(vec![bio_call("c1", "Ada")]);
        h.llm.push_text("Ada Lovelace was a mathematician.");

        let response = h.orchestrator.handle_query("s", "who is Ada").await.unwrap();
        // Successful tools leave no markers; separator prefix then synthesis.
        assert_eq!(response, "\n\nAda Lovelace was a mathematician.");

        let requests = h.llm.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 5);
        assert!((requests[0].temperature - 0.3).abs() < 1e-6);
        assert!(requests[1].tools.is_empty());
        assert_eq!(requests[1].max_tokens, Some(1000));
        // Synthesis context carries a tool-role message per outcome.
        assert!(requests[1]
            .messages
            .iter()
            .any(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some("c1")));
    }

    #[tokio::test]
    async fn test_failed_tool_marker_prefixes_response() {
        let h = harness();
        h.provider.set_failing("Ada", "provider offline");
        h.llm.push_tool_calls(vec![bio_call("c1", "Ada")]);
        h.llm.push_text("I could not find that.");

        let response = h.orchestrator.handle_query("s", "who is Ada").await.unwrap();
        assert!(response.starts_with("**Error:** provider offline"));
        assert!(response.ends_with("I could not find that."));
    }

    #[tokio::test]
    async fn test_provider_failure_persists_error_text() {
        let h = harness();
        h.llm.fail_next();

        let response = h.orchestrator.handle_query("s", "hi").await.unwrap();
        assert!(response.starts_with("Error processing request:"));

        let stored = h.history.read_all("s", 50).await.unwrap();
        assert_eq!(stored[1].role, Role::Assistant);
        assert_eq!(stored[1].content, response);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_hard_failure() {
        let h = harness();
        h.history.set_unavailable(true);
        assert!(h.orchestrator.handle_query("s", "hi").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_direct_answer_gets_fallback() {
        let h = harness();
        h.llm.push_text("");
        let response = h.orchestrator.handle_query("s", "hi").await.unwrap();
        assert_eq!(response, EMPTY_RESPONSE_FALLBACK);
    }

    // ---- streamed turns ----

    #[tokio::test]
    async fn test_streamed_casual_turn() {
        let h = harness();
        // Decision reply, then the streamed casual completion.
        h.llm.push_text("decision");
        h.llm.push_text("Hello streaming world.");

        let rx = h.orchestrator.stream_query("s", "hi").await.unwrap();
        let (text, reason) = collect(rx).await;
        assert_eq!(text, "Hello streaming world.");
        assert_eq!(reason, EndReason::Done);

        let stored = h.history.read_all("s", 50).await.unwrap();
        assert_eq!(stored[1].content, "Hello streaming world.");
    }

    #[tokio::test]
    async fn test_streamed_and_whole_persist_identical_response() {
        let script = |h: &Harness| {
            h.provider.set_failing("Ada", "offline");
            h.llm.push_tool_calls(vec![bio_call("c1", "Ada")]);
            h.llm.push_text("Sorry, the lookup failed.");
        };

        let whole = harness();
        script(&whole);
        let whole_response = whole.orchestrator.handle_query("s", "who is Ada").await.unwrap();

        let streamed = harness();
        script(&streamed);
        let rx = streamed.orchestrator.stream_query("s", "who is Ada").await.unwrap();
        let (streamed_text, reason) = collect(rx).await;

        assert_eq!(reason, EndReason::Done);
        assert_eq!(streamed_text, whole_response);
        assert_eq!(
            whole.archive.recorded_turns()[0].assistant,
            streamed.archive.recorded_turns()[0].assistant
        );
    }

    #[tokio::test]
    async fn test_streamed_empty_response_not_persisted() {
        let h = harness();
        h.llm.push_text("decision");
        h.llm.push_text("");

        let rx = h.orchestrator.stream_query("s", "hi").await.unwrap();
        let (text, reason) = collect(rx).await;
        assert_eq!(text, "");
        assert_eq!(reason, EndReason::Done);

        // Only the user message is stored; nothing archived.
        assert_eq!(h.history.read_all("s", 50).await.unwrap().len(), 1);
        assert!(h.archive.recorded_turns().is_empty());
    }

    #[tokio::test]
    async fn test_streamed_provider_error_emits_error_end() {
        let h = harness();
        h.llm.fail_next();

        let rx = h.orchestrator.stream_query("s", "hi").await.unwrap();
        let (text, reason) = collect(rx).await;
        assert!(text.starts_with("Streaming error:"));
        assert_eq!(reason, EndReason::Error);

        // The error text is persisted as the response.
        let stored = h.history.read_all("s", 50).await.unwrap();
        assert_eq!(stored[1].content, text);
    }

    #[tokio::test]
    async fn test_dropped_receiver_skips_persistence() {
        let h = harness();
        h.provider.set_bio("Ada", "Ada: mathematician");
        h.llm.push_tool_calls(vec![bio_call("c1", "Ada")]);
        h.llm.push_text("unused synthesis");

        let rx = h.orchestrator.stream_query("s", "who is Ada").await.unwrap();
        drop(rx);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // User message only; cancelled turns persist no response.
        assert_eq!(h.history.read_all("s", 50).await.unwrap().len(), 1);
        assert!(h.archive.recorded_turns().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_tool_calls_execute_once_in_stream() {
        let h = harness();
        h.provider.set_bio("Ada", "Ada: mathematician");
        h.llm
            .push_tool_calls(vec![bio_call("c1", "Ada"), bio_call("c2", "Ada")]);
        h.llm.push_text("done.");

        let rx = h.orchestrator.stream_query("s", "who is Ada").await.unwrap();
        let (_, reason) = collect(rx).await;
        assert_eq!(reason, EndReason::Done);
        assert_eq!(h.provider.recorded_calls(), vec!["bio:Ada"]);
    }
}
