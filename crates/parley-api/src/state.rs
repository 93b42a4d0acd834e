//! Application state shared across all route handlers.
//!
//! AppState holds references to all services and shared resources.
//! It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use parley_chat::ChatOrchestrator;
use parley_core::config::ParleyConfig;
use parley_history::{ArchiveStore, HistoryStore};
use parley_transcribe::TranscriptionService;
use parley_voice::VoiceEndpointer;

use crate::rate_limit::RateLimiter;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<ParleyConfig>,
    /// Two-phase turn orchestration engine.
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Per-session message history, read directly by the REST endpoints.
    pub history: Arc<dyn HistoryStore>,
    /// Per-turn archive, pinged by the health check.
    pub archive: Arc<dyn ArchiveStore>,
    /// Audio endpointing for the voice channel.
    pub endpointer: Arc<VoiceEndpointer>,
    /// Speech-to-text service for the direct transcription endpoint.
    pub transcriber: Arc<dyn TranscriptionService>,
    /// Per-client request rate limiter.
    pub limiter: Arc<RateLimiter>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: ParleyConfig,
        orchestrator: ChatOrchestrator,
        history: Arc<dyn HistoryStore>,
        archive: Arc<dyn ArchiveStore>,
        endpointer: VoiceEndpointer,
        transcriber: Arc<dyn TranscriptionService>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            history,
            archive,
            endpointer: Arc::new(endpointer),
            transcriber,
            limiter,
            start_time: Instant::now(),
        }
    }
}
