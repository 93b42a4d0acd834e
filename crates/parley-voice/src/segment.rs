//! Per-recording chunk buffer.

use parley_core::{ParleyError, Result};

/// Bounded list of base64 audio chunks plus the silence counter for one
/// in-flight recording. Cleared on every end-of-recording trigger.
#[derive(Debug)]
pub struct AudioSegment {
    chunks: Vec<String>,
    silence_count: u32,
    max_chunks: usize,
}

impl AudioSegment {
    pub fn new(max_chunks: usize) -> Self {
        Self {
            chunks: Vec::new(),
            silence_count: 0,
            max_chunks,
        }
    }

    pub fn push_chunk(&mut self, data_b64: String) -> Result<()> {
        if self.chunks.len() >= self.max_chunks {
            return Err(ParleyError::Voice(format!(
                "recording exceeds {} chunks",
                self.max_chunks
            )));
        }
        self.chunks.push(data_b64);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Record a silent chunk. Returns the updated consecutive-silence count.
    pub fn note_silence(&mut self) -> u32 {
        self.silence_count += 1;
        self.silence_count
    }

    /// Record a speech chunk, resetting the silence run.
    pub fn note_speech(&mut self) {
        self.silence_count = 0;
    }

    pub fn silence_count(&self) -> u32 {
        self.silence_count
    }

    /// Take all buffered chunks and reset the segment.
    pub fn drain(&mut self) -> Vec<String> {
        self.silence_count = 0;
        std::mem::take(&mut self.chunks)
    }
}
