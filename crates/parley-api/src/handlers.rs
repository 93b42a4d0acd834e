//! Route handler functions for the REST and SSE endpoints.
//!
//! Each handler extracts parameters via axum extractors, validates at the
//! boundary, checks the per-client rate limit, and delegates to the
//! orchestration engine or the stores.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use parley_chat::{ChatEvent, ChatEventStream, EventBatcher};
use parley_core::types::{normalize_session_id, EndReason, StoredMessage, MAX_SESSION_ID_LEN};

use crate::error::ApiError;
use crate::rate_limit::{client_key, RequestClass};
use crate::state::AppState;

/// Maximum accepted query length in characters.
pub const MAX_QUERY_LEN: usize = 1000;

const DEFAULT_CONVERSATION_LIMIT: usize = 50;
const MAX_CONVERSATION_LIMIT: usize = 100;

// =============================================================================
// Request and response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub query: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageView {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub session_id: String,
    pub messages: Vec<MessageView>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub session_id: String,
    pub cleared: u64,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

// =============================================================================
// Validation helpers
// =============================================================================

/// Validate the query text at the boundary: trimmed, non-empty, bounded.
pub fn validate_query(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("Query cannot be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_QUERY_LEN {
        return Err(ApiError::BadRequest(format!(
            "Query exceeds {} characters",
            MAX_QUERY_LEN
        )));
    }
    Ok(trimmed.to_string())
}

/// Normalize the session id, substituting the default for a missing or
/// empty value and rejecting oversized ids.
pub fn validate_session_id(raw: Option<&str>) -> Result<String, ApiError> {
    normalize_session_id(raw.unwrap_or("")).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "session_id exceeds {} characters",
            MAX_SESSION_ID_LEN
        ))
    })
}

fn check_rate(state: &AppState, headers: &HeaderMap, class: RequestClass) -> Result<(), ApiError> {
    let client = client_key(headers);
    if state.limiter.check(&client, class) {
        Ok(())
    } else {
        warn!(client = %client, ?class, "Rate limit exceeded");
        Err(ApiError::TooManyRequests("Rate limit exceeded".to_string()))
    }
}

// =============================================================================
// Chat endpoints
// =============================================================================

/// POST /chatbot - run one whole turn and return the complete response.
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    check_rate(&state, &headers, RequestClass::Chat)?;
    let query = validate_query(&request.query)?;
    let session_id = validate_session_id(request.session_id.as_deref())?;

    let response = state
        .orchestrator
        .handle_query(&session_id, &query)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ChatResponse {
        response,
        session_id,
        timestamp: Utc::now(),
        method: "post".to_string(),
    }))
}

/// GET /chatbot/stream - SSE stream of buffered response chunks.
///
/// Each data event carries one chunk as a JSON string; a terminal `end`
/// event carries the sentinel. Chunks are paced so slow renderers keep up.
pub async fn chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<StreamParams>,
) -> Result<Sse<KeepAliveStream<ReceiverStream<Result<Event, Infallible>>>>, ApiError> {
    check_rate(&state, &headers, RequestClass::Chat)?;
    let query = validate_query(&params.query)?;
    let session_id = validate_session_id(params.session_id.as_deref())?;

    // Store failures surface as a plain 500 before the stream opens.
    let events = state
        .orchestrator
        .stream_query(&session_id, &query)
        .await
        .map_err(ApiError::from)?;

    let (tx, rx) = mpsc::channel(32);
    let pacing = Duration::from_millis(state.config.stream.pacing_delay_ms);
    tokio::spawn(forward_plain_stream(events, tx, pacing));

    Ok(Sse::new(ReceiverStream::new(rx))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

async fn forward_plain_stream(
    mut events: ChatEventStream,
    tx: mpsc::Sender<Result<Event, Infallible>>,
    pacing: Duration,
) {
    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::Text(chunk) => {
                let data = serde_json::to_string(&chunk).unwrap_or_default();
                if tx.send(Ok(Event::default().data(data))).await.is_err() {
                    // Client went away; dropping `events` cancels the turn.
                    return;
                }
                tokio::time::sleep(pacing).await;
            }
            ChatEvent::End(reason) => {
                let _ = tx
                    .send(Ok(Event::default().event("end").data(reason.sentinel())))
                    .await;
                return;
            }
        }
    }
    // Engine dropped without a terminal event.
    let _ = tx
        .send(Ok(Event::default()
            .event("end")
            .data(EndReason::Error.sentinel())))
        .await;
}

/// GET /chatbot/stream-v2 - SSE stream with named events and batching.
///
/// Opens with a `start` event, delivers `chunk` events batched to roughly
/// one hundred bytes, and closes with exactly one of `complete`,
/// `cancelled`, `error`, or `timeout`. An inactivity watchdog fires the
/// timeout when the engine produces nothing for the configured interval.
pub async fn chat_stream_v2(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<StreamParams>,
) -> Result<Sse<KeepAliveStream<ReceiverStream<Result<Event, Infallible>>>>, ApiError> {
    check_rate(&state, &headers, RequestClass::Chat)?;
    let query = validate_query(&params.query)?;
    let session_id = validate_session_id(params.session_id.as_deref())?;

    let events = state
        .orchestrator
        .stream_query(&session_id, &query)
        .await
        .map_err(ApiError::from)?;

    let (tx, rx) = mpsc::channel(32);
    let batch_bytes = state.config.stream.v2_batch_bytes;
    let inactivity = Duration::from_secs(state.config.stream.inactivity_timeout_secs);
    tokio::spawn(forward_batched_stream(
        events, tx, session_id, batch_bytes, inactivity,
    ));

    Ok(Sse::new(ReceiverStream::new(rx))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

async fn forward_batched_stream(
    mut events: ChatEventStream,
    tx: mpsc::Sender<Result<Event, Infallible>>,
    session_id: String,
    batch_bytes: usize,
    inactivity: Duration,
) {
    let start = serde_json::json!({ "session_id": session_id }).to_string();
    if tx
        .send(Ok(Event::default().event("start").data(start)))
        .await
        .is_err()
    {
        return;
    }

    let mut batcher = EventBatcher::new(batch_bytes);
    loop {
        let next = match tokio::time::timeout(inactivity, events.recv()).await {
            Ok(next) => next,
            Err(_) => {
                info!(session = %session_id, "Stream inactivity timeout");
                let _ = tx
                    .send(Ok(Event::default()
                        .event("timeout")
                        .data(EndReason::Timeout.sentinel())))
                    .await;
                return;
            }
        };

        match next {
            Some(ChatEvent::Text(chunk)) => {
                if let Some(batch) = batcher.push(&chunk) {
                    if !send_chunk(&tx, batch).await {
                        return;
                    }
                }
            }
            Some(ChatEvent::End(reason)) => {
                if let Some(rest) = batcher.finish() {
                    if !send_chunk(&tx, rest).await {
                        return;
                    }
                }
                let name = match reason {
                    EndReason::Done => "complete",
                    EndReason::Cancelled => "cancelled",
                    EndReason::Error | EndReason::Timeout => "error",
                };
                let _ = tx
                    .send(Ok(Event::default().event(name).data(reason.sentinel())))
                    .await;
                return;
            }
            None => {
                let _ = tx
                    .send(Ok(Event::default()
                        .event("error")
                        .data(EndReason::Error.sentinel())))
                    .await;
                return;
            }
        }
    }
}

async fn send_chunk(tx: &mpsc::Sender<Result<Event, Infallible>>, batch: String) -> bool {
    let data = serde_json::to_string(&batch).unwrap_or_default();
    tx.send(Ok(Event::default().event("chunk").data(data)))
        .await
        .is_ok()
}

// =============================================================================
// Transcription endpoint
// =============================================================================

/// POST /transcribe - transcribe an uploaded audio file.
pub async fn transcribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<TranscribeResponse>, ApiError> {
    check_rate(&state, &headers, RequestClass::Chat)?;

    let mut audio: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("audio") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read audio field: {}", e)))?;
            audio = Some(bytes.to_vec());
        }
    }

    let audio = audio.ok_or_else(|| ApiError::BadRequest("No audio file provided".to_string()))?;
    if audio.is_empty() {
        return Err(ApiError::BadRequest("Audio file is empty".to_string()));
    }

    info!(bytes = audio.len(), "Transcribing uploaded audio");
    let text = state
        .transcriber
        .transcribe(&audio)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(TranscribeResponse { text }))
}

// =============================================================================
// Conversation endpoints
// =============================================================================

/// GET /conversations/{session_id} - the last N stored messages.
pub async fn get_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Query(params): Query<ConversationParams>,
) -> Result<Json<ConversationResponse>, ApiError> {
    check_rate(&state, &headers, RequestClass::Read)?;
    let session_id = validate_session_id(Some(&session_id))?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_CONVERSATION_LIMIT)
        .clamp(1, MAX_CONVERSATION_LIMIT);

    let messages = state
        .history
        .read_all(&session_id, limit)
        .await
        .map_err(ApiError::from)?;

    let views: Vec<MessageView> = messages.iter().map(message_view).collect();
    let count = views.len();
    Ok(Json(ConversationResponse {
        session_id,
        messages: views,
        count,
    }))
}

/// DELETE /conversations/{session_id} - clear a session's history.
pub async fn clear_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    check_rate(&state, &headers, RequestClass::Delete)?;
    let session_id = validate_session_id(Some(&session_id))?;

    let cleared = state
        .history
        .clear(&session_id)
        .await
        .map_err(ApiError::from)?;

    info!(session = %session_id, cleared, "Conversation cleared");
    Ok(Json(ClearResponse {
        message: format!("Cleared {} messages", cleared),
        session_id,
        cleared,
    }))
}

fn message_view(message: &StoredMessage) -> MessageView {
    MessageView {
        role: message.role.as_str().to_string(),
        content: message.content.clone(),
        timestamp: message.timestamp,
    }
}

// =============================================================================
// Service endpoints
// =============================================================================

/// GET /health - liveness plus backing-store reachability.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    state.history.ping().await.map_err(ApiError::from)?;
    state.archive.ping().await.map_err(ApiError::from)?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

/// GET /info - static service description.
pub async fn info_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "parley",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.config.llm.model,
        "endpoints": {
            "chat": "POST /chatbot",
            "stream": "GET /chatbot/stream",
            "stream_v2": "GET /chatbot/stream-v2",
            "transcribe": "POST /transcribe",
            "voice": "WS /voice/chat",
            "conversation": "GET /conversations/{session_id}",
            "clear": "DELETE /conversations/{session_id}",
            "health": "GET /health",
        },
    }))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_query_trims_and_bounds() {
        assert_eq!(validate_query("  hi  ").unwrap(), "hi");
        assert!(validate_query("").is_err());
        assert!(validate_query("   ").is_err());
        assert!(validate_query(&"x".repeat(1000)).is_ok());
        assert!(validate_query(&"x".repeat(1001)).is_err());
    }

    #[test]
    fn test_validate_session_id_defaults() {
        assert_eq!(validate_session_id(None).unwrap(), "default");
        assert_eq!(validate_session_id(Some("")).unwrap(), "default");
        assert_eq!(validate_session_id(Some(" abc ")).unwrap(), "abc");
        assert!(validate_session_id(Some(&"s".repeat(51))).is_err());
    }
}
