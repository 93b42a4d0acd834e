//! Audio endpointing state machine.
//!
//! A [`VoiceSession`] is Idle until its first chunk arrives, then Recording
//! until a silence run or an explicit end signal triggers end-of-recording.
//! Both triggers run the identical finish path.

use std::sync::Arc;

use tracing::{info, warn};

use parley_core::config::VoiceConfig;
use parley_core::Result;
use parley_transcribe::TranscriptionService;

use crate::segment::AudioSegment;
use crate::vad::VadModel;
use crate::wav;

/// Per-connection recording state.
pub struct VoiceSession {
    segment: AudioSegment,
}

impl VoiceSession {
    pub fn new(config: &VoiceConfig) -> Self {
        Self {
            segment: AudioSegment::new(config.max_chunks),
        }
    }

    pub fn is_recording(&self) -> bool {
        !self.segment.is_empty()
    }
}

/// What happened to one inbound chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkDecision {
    /// Chunk buffered; recording continues.
    Continue { speech: bool },
    /// Silence run reached the threshold; caller must finish the recording.
    EndTriggered { speech: bool },
}

impl ChunkDecision {
    pub fn speech(&self) -> bool {
        match self {
            ChunkDecision::Continue { speech } | ChunkDecision::EndTriggered { speech } => *speech,
        }
    }
}

/// Result of an end-of-recording pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    /// Nothing was buffered.
    NoAudio,
    /// A chunk failed to decode; the batch is discarded.
    InvalidChunk(String),
    /// Chunks disagreed on sample rate; the batch is discarded.
    MixedSampleRates,
    /// Transcription heard nothing intelligible.
    EmptyTranscript,
    /// A usable transcript, ready for the text pipeline.
    Transcript(String),
}

pub struct VoiceEndpointer {
    vad: Arc<VadModel>,
    transcriber: Arc<dyn TranscriptionService>,
    config: VoiceConfig,
}

impl VoiceEndpointer {
    pub fn new(
        vad: Arc<VadModel>,
        transcriber: Arc<dyn TranscriptionService>,
        config: VoiceConfig,
    ) -> Self {
        Self {
            vad,
            transcriber,
            config,
        }
    }

    pub fn new_session(&self) -> VoiceSession {
        VoiceSession::new(&self.config)
    }

    /// Buffer one chunk and run VAD on it.
    ///
    /// Silence increments the session's counter; speech resets it. When the
    /// counter reaches the configured threshold the caller is told to end
    /// the recording; the counter resets either way at the end trigger.
    pub fn ingest_chunk(&self, session: &mut VoiceSession, data_b64: &str) -> Result<ChunkDecision> {
        session.segment.push_chunk(data_b64.to_string())?;

        let decoded = wav::decode_wav_chunk(data_b64)?;
        let speech = self.vad.detect(&decoded.samples, decoded.sample_rate)?;

        if speech {
            session.segment.note_speech();
            return Ok(ChunkDecision::Continue { speech: true });
        }

        let run = session.segment.note_silence();
        if run >= self.config.silence_threshold {
            info!(run, "Silence threshold reached, ending recording");
            return Ok(ChunkDecision::EndTriggered { speech: false });
        }
        Ok(ChunkDecision::Continue { speech: false })
    }

    /// Drain the session and transcribe whatever was recorded.
    ///
    /// Runs identically for the auto-trigger and an explicit client end
    /// signal. The segment is cleared on every path, success or failure.
    pub async fn finish_recording(&self, session: &mut VoiceSession) -> RecordingOutcome {
        let chunks = session.segment.drain();
        if chunks.is_empty() {
            return RecordingOutcome::NoAudio;
        }

        let mut waveforms = Vec::with_capacity(chunks.len());
        let mut sample_rate = None;
        let mut mixed = false;
        for chunk in &chunks {
            match wav::decode_wav_chunk(chunk) {
                Ok(decoded) => {
                    match sample_rate {
                        None => sample_rate = Some(decoded.sample_rate),
                        Some(rate) if rate != decoded.sample_rate => mixed = true,
                        Some(_) => {}
                    }
                    waveforms.push(decoded.samples);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to decode buffered audio chunk");
                    return RecordingOutcome::InvalidChunk(e.to_string());
                }
            }
        }
        if mixed {
            warn!("Inconsistent sample rates in recording, discarding batch");
            return RecordingOutcome::MixedSampleRates;
        }
        let Some(rate) = sample_rate else {
            return RecordingOutcome::NoAudio;
        };

        let full: Vec<f32> = waveforms.into_iter().flatten().collect();
        let wav_bytes = match wav::encode_wav(&full, rate) {
            Ok(bytes) => bytes,
            Err(e) => return RecordingOutcome::InvalidChunk(e.to_string()),
        };

        info!(
            chunks = chunks.len(),
            samples = full.len(),
            rate,
            "Transcribing recording"
        );
        match self.transcriber.transcribe(&wav_bytes).await {
            Ok(text) if text.trim().is_empty() => RecordingOutcome::EmptyTranscript,
            Ok(text) => RecordingOutcome::Transcript(text.trim().to_string()),
            Err(e) => {
                warn!(error = %e, "Transcription failed");
                RecordingOutcome::InvalidChunk(e.to_string())
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vad::EnergyVad;
    use crate::wav::encode_wav_base64;
    use parley_transcribe::MockTranscriptionService;

    fn endpointer(transcriber: Arc<MockTranscriptionService>) -> VoiceEndpointer {
        let vad = Arc::new(VadModel::loaded(Box::new(EnergyVad::new(0.05))));
        VoiceEndpointer::new(vad, transcriber, VoiceConfig::default())
    }

    fn speech_chunk(rate: u32) -> String {
        let samples: Vec<f32> = (0..800).map(|i| 0.5 * (i as f32 * 0.3).sin()).collect();
        encode_wav_base64(&samples, rate).unwrap()
    }

    fn silent_chunk(rate: u32) -> String {
        encode_wav_base64(&vec![0.0f32; 800], rate).unwrap()
    }

    #[tokio::test]
    async fn test_silence_run_triggers_end() {
        let mock = Arc::new(MockTranscriptionService::new());
        let ep = endpointer(mock);
        let mut session = ep.new_session();

        // Default threshold is 3 consecutive silent chunks.
        let d = ep.ingest_chunk(&mut session, &speech_chunk(16000)).unwrap();
        assert_eq!(d, ChunkDecision::Continue { speech: true });
        for _ in 0..2 {
            let d = ep.ingest_chunk(&mut session, &silent_chunk(16000)).unwrap();
            assert_eq!(d, ChunkDecision::Continue { speech: false });
        }
        let d = ep.ingest_chunk(&mut session, &silent_chunk(16000)).unwrap();
        assert_eq!(d, ChunkDecision::EndTriggered { speech: false });
    }

    #[tokio::test]
    async fn test_speech_resets_silence_run() {
        let mock = Arc::new(MockTranscriptionService::new());
        let ep = endpointer(mock);
        let mut session = ep.new_session();

        for _ in 0..2 {
            ep.ingest_chunk(&mut session, &silent_chunk(16000)).unwrap();
        }
        ep.ingest_chunk(&mut session, &speech_chunk(16000)).unwrap();
        for _ in 0..2 {
            let d = ep.ingest_chunk(&mut session, &silent_chunk(16000)).unwrap();
            assert_eq!(d, ChunkDecision::Continue { speech: false });
        }
    }

    #[tokio::test]
    async fn test_finish_with_no_chunks_issues_no_transcription() {
        let mock = Arc::new(MockTranscriptionService::new());
        let ep = endpointer(Arc::clone(&mock));
        let mut session = ep.new_session();

        assert_eq!(
            ep.finish_recording(&mut session).await,
            RecordingOutcome::NoAudio
        );
        assert!(mock.call_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_finish_transcribes_concatenated_chunks() {
        let mock = Arc::new(MockTranscriptionService::new());
        mock.push_transcript("hello there");
        let ep = endpointer(Arc::clone(&mock));
        let mut session = ep.new_session();

        ep.ingest_chunk(&mut session, &speech_chunk(16000)).unwrap();
        ep.ingest_chunk(&mut session, &speech_chunk(16000)).unwrap();

        assert_eq!(
            ep.finish_recording(&mut session).await,
            RecordingOutcome::Transcript("hello there".to_string())
        );
        assert_eq!(mock.call_sizes().len(), 1);
        assert!(!session.is_recording());
    }

    #[tokio::test]
    async fn test_mixed_sample_rates_discard_batch() {
        let mock = Arc::new(MockTranscriptionService::new());
        let ep = endpointer(Arc::clone(&mock));
        let mut session = ep.new_session();

        ep.ingest_chunk(&mut session, &speech_chunk(16000)).unwrap();
        ep.ingest_chunk(&mut session, &speech_chunk(8000)).unwrap();

        assert_eq!(
            ep.finish_recording(&mut session).await,
            RecordingOutcome::MixedSampleRates
        );
        assert!(mock.call_sizes().is_empty());
        assert!(!session.is_recording());
    }

    #[tokio::test]
    async fn test_empty_transcript_is_reported() {
        let mock = Arc::new(MockTranscriptionService::new());
        mock.push_transcript("   ");
        let ep = endpointer(mock);
        let mut session = ep.new_session();

        ep.ingest_chunk(&mut session, &speech_chunk(16000)).unwrap();
        assert_eq!(
            ep.finish_recording(&mut session).await,
            RecordingOutcome::EmptyTranscript
        );
    }

    #[tokio::test]
    async fn test_undecodable_chunk_is_rejected_at_ingest() {
        let mock = Arc::new(MockTranscriptionService::new());
        let ep = endpointer(mock);
        let mut session = ep.new_session();
        assert!(ep.ingest_chunk(&mut session, "bm90IGEgd2F2").is_err());
    }
}
