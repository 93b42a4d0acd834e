//! Transcription trait and test double.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use parley_core::{ParleyError, Result};

/// Speech-to-text over an encoded audio payload.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Transcribe encoded audio. Returns trimmed text; an empty string
    /// means nothing intelligible was heard.
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

/// Scripted transcription service for tests.
#[derive(Default)]
pub struct MockTranscriptionService {
    script: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<usize>>,
    fail_next: Mutex<bool>,
}

impl MockTranscriptionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_transcript(&self, text: impl Into<String>) {
        self.script.lock().unwrap().push_back(text.into());
    }

    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    /// Byte lengths of the audio payloads seen so far.
    pub fn call_sizes(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranscriptionService for MockTranscriptionService {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        self.calls.lock().unwrap().push(audio.len());
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(ParleyError::Transcription("scripted failure".to_string()));
        }
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_pops_scripted_transcripts() {
        let mock = MockTranscriptionService::new();
        mock.push_transcript("hello world");
        assert_eq!(mock.transcribe(&[1, 2, 3]).await.unwrap(), "hello world");
        // Exhausted script yields an empty transcript, not an error.
        assert_eq!(mock.transcribe(&[4]).await.unwrap(), "");
        assert_eq!(mock.call_sizes(), vec![3, 1]);
    }

    #[tokio::test]
    async fn test_mock_fail_next() {
        let mock = MockTranscriptionService::new();
        mock.fail_next();
        assert!(mock.transcribe(&[0]).await.is_err());
    }
}
