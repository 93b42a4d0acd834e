//! Parley transcribe crate - speech-to-text service.
//!
//! One trait, one HTTP implementation against an OpenAI-compatible Whisper
//! endpoint, and a scriptable mock for tests.

pub mod service;
pub mod whisper;

pub use service::{MockTranscriptionService, TranscriptionService};
pub use whisper::WhisperApiService;
