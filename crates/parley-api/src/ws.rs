//! Voice chat WebSocket endpoint.
//!
//! One socket carries one session: the client uploads base64 WAV chunks,
//! the server answers each with a VAD verdict and an acknowledgement, and
//! either a silence run or an explicit end signal closes the recording.
//! The transcript then runs through the normal chat turn with the response
//! streamed back as text events. After each turn the session resets for
//! the next utterance.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use parley_chat::ChatEvent;
use parley_core::types::{normalize_session_id, EndReason};
use parley_voice::{ChunkDecision, RecordingOutcome, VoiceSession};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VoiceParams {
    pub session_id: Option<String>,
}

/// Messages accepted from the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    AudioChunk { data: String, index: u32 },
    EndRecording,
    Cancel,
}

/// Messages sent to the client.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Vad { active: bool },
    ChunkReceived { index: u32 },
    Status { message: String },
    Transcript { text: String },
    Text { content: String },
    Error { message: String },
}

/// GET /voice/chat - upgrade to the voice protocol.
pub async fn voice_chat(
    State(state): State<AppState>,
    Query(params): Query<VoiceParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let session_id = normalize_session_id(params.session_id.as_deref().unwrap_or(""))
        .unwrap_or_else(|| "default".to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, session_id: String) {
    info!(session = %session_id, "Voice socket opened");
    let mut recording = state.endpointer.new_session();

    while let Some(message) = socket.recv().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                warn!(session = %session_id, error = %e, "Voice socket receive failed");
                break;
            }
        };
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            // Pings are answered by axum; other frame types are ignored.
            _ => continue,
        };

        let event: ClientEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(e) => {
                send(
                    &mut socket,
                    &ServerEvent::Error {
                        message: format!("Invalid message: {}", e),
                    },
                )
                .await;
                continue;
            }
        };

        match event {
            ClientEvent::AudioChunk { data, index } => {
                match state.endpointer.ingest_chunk(&mut recording, &data) {
                    Ok(decision) => {
                        let speech = decision.speech();
                        if !send(&mut socket, &ServerEvent::Vad { active: speech }).await {
                            break;
                        }
                        if !send(&mut socket, &ServerEvent::ChunkReceived { index }).await {
                            break;
                        }
                        if matches!(decision, ChunkDecision::EndTriggered { .. })
                            && !run_turn(&mut socket, &state, &session_id, &mut recording).await
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        if !send(
                            &mut socket,
                            &ServerEvent::Error {
                                message: e.to_string(),
                            },
                        )
                        .await
                        {
                            break;
                        }
                    }
                }
            }
            ClientEvent::EndRecording => {
                if !run_turn(&mut socket, &state, &session_id, &mut recording).await {
                    break;
                }
            }
            ClientEvent::Cancel => {
                recording = state.endpointer.new_session();
                if !send(
                    &mut socket,
                    &ServerEvent::Status {
                        message: "Cancelled".to_string(),
                    },
                )
                .await
                {
                    break;
                }
            }
        }
    }
    info!(session = %session_id, "Voice socket closed");
}

/// Finish the recording and, if it yielded a transcript, stream one chat
/// turn back. Returns false when the socket is gone.
async fn run_turn(
    socket: &mut WebSocket,
    state: &AppState,
    session_id: &str,
    recording: &mut VoiceSession,
) -> bool {
    // Recordings that yield nothing usable end with a status message, not
    // an error; the client simply starts the next utterance.
    let transcript = match state.endpointer.finish_recording(recording).await {
        RecordingOutcome::Transcript(text) => text,
        RecordingOutcome::NoAudio => {
            return send_status(socket, "No audio received").await;
        }
        RecordingOutcome::EmptyTranscript => {
            return send_status(socket, "No speech detected").await;
        }
        RecordingOutcome::MixedSampleRates => {
            return send_status(socket, "Inconsistent audio sample rates").await;
        }
        RecordingOutcome::InvalidChunk(message) => {
            return send_status(socket, &format!("Could not process audio: {}", message)).await;
        }
    };

    if !send(socket, &ServerEvent::Transcript { text: transcript.clone() }).await {
        return false;
    }

    let mut events = match state.orchestrator.stream_query(session_id, &transcript).await {
        Ok(events) => events,
        Err(e) => {
            return send(
                socket,
                &ServerEvent::Error {
                    message: e.to_string(),
                },
            )
            .await;
        }
    };

    while let Some(event) = events.recv().await {
        let out = match event {
            ChatEvent::Text(content) => ServerEvent::Text { content },
            ChatEvent::End(EndReason::Done) => ServerEvent::Status {
                message: "complete".to_string(),
            },
            ChatEvent::End(reason) => ServerEvent::Error {
                message: reason.sentinel().to_string(),
            },
        };
        if !send(socket, &out).await {
            // Dropping `events` cancels the rest of the turn.
            return false;
        }
    }
    true
}

async fn send_status(socket: &mut WebSocket, message: &str) -> bool {
    send(
        socket,
        &ServerEvent::Status {
            message: message.to_string(),
        },
    )
    .await
}

async fn send(socket: &mut WebSocket, event: &ServerEvent) -> bool {
    let payload = match serde_json::to_string(event) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Failed to serialize voice event");
            return true;
        }
    };
    socket.send(Message::Text(payload.into())).await.is_ok()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_events_deserialize() {
        let chunk: ClientEvent =
            serde_json::from_str(r#"{"type":"audio_chunk","data":"QUJD","index":3}"#).unwrap();
        assert!(matches!(chunk, ClientEvent::AudioChunk { index: 3, .. }));

        let end: ClientEvent = serde_json::from_str(r#"{"type":"end_recording"}"#).unwrap();
        assert!(matches!(end, ClientEvent::EndRecording));

        let cancel: ClientEvent = serde_json::from_str(r#"{"type":"cancel"}"#).unwrap();
        assert!(matches!(cancel, ClientEvent::Cancel));
    }

    #[test]
    fn test_server_events_serialize_with_type_tag() {
        let vad = serde_json::to_value(ServerEvent::Vad { active: true }).unwrap();
        assert_eq!(vad["type"], "vad");
        assert_eq!(vad["active"], true);

        let ack = serde_json::to_value(ServerEvent::ChunkReceived { index: 7 }).unwrap();
        assert_eq!(ack["type"], "chunk_received");
        assert_eq!(ack["index"], 7);

        let text = serde_json::to_value(ServerEvent::Text {
            content: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(text["type"], "text");
        assert_eq!(text["content"], "hi");
    }
}
