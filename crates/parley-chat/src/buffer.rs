//! Chunk coalescing for streamed output.
//!
//! One buffering rule serves every channel: accumulate deltas and release
//! when the buffer reaches a minimum size or the newest delta ends in
//! sentence-terminal punctuation or a newline. The enhanced SSE endpoint
//! adds a second, larger batching stage on top.

/// Dual-threshold accumulate-then-flush buffer.
#[derive(Debug)]
pub struct ChunkBuffer {
    buf: String,
    min_flush: usize,
}

impl ChunkBuffer {
    pub fn new(min_flush: usize) -> Self {
        Self {
            buf: String::new(),
            min_flush,
        }
    }

    /// Add one delta. Returns the buffered text when it should be released.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        self.buf.push_str(delta);
        let terminal = delta
            .chars()
            .last()
            .map(|c| matches!(c, '.' | '!' | '?' | '\n'))
            .unwrap_or(false);
        if self.buf.len() >= self.min_flush || terminal {
            Some(std::mem::take(&mut self.buf))
        } else {
            None
        }
    }

    /// Release whatever remains.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

/// Second-stage batcher for the enhanced SSE endpoint: accumulates flushed
/// chunks and releases at a byte threshold or when a chunk carries a
/// newline.
#[derive(Debug)]
pub struct EventBatcher {
    buf: String,
    batch_bytes: usize,
}

impl EventBatcher {
    pub fn new(batch_bytes: usize) -> Self {
        Self {
            buf: String::new(),
            batch_bytes,
        }
    }

    pub fn push(&mut self, chunk: &str) -> Option<String> {
        self.buf.push_str(chunk);
        if self.buf.len() >= self.batch_bytes || chunk.contains('\n') {
            Some(std::mem::take(&mut self.buf))
        } else {
            None
        }
    }

    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_at_min_size() {
        let mut buffer = ChunkBuffer::new(8);
        assert_eq!(buffer.push("abc"), None);
        assert_eq!(buffer.push("defgh"), Some("abcdefgh".to_string()));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_flush_on_terminal_punctuation() {
        let mut buffer = ChunkBuffer::new(100);
        assert_eq!(buffer.push("Hi"), None);
        assert_eq!(buffer.push("."), Some("Hi.".to_string()));
        assert_eq!(buffer.push("ok!"), Some("ok!".to_string()));
        assert_eq!(buffer.push("eh?"), Some("eh?".to_string()));
        assert_eq!(buffer.push("line\n"), Some("line\n".to_string()));
    }

    #[test]
    fn test_punctuation_mid_delta_does_not_flush() {
        let mut buffer = ChunkBuffer::new(100);
        assert_eq!(buffer.push("a. b"), None);
        assert_eq!(buffer.finish(), Some("a. b".to_string()));
    }

    #[test]
    fn test_reassembly_is_lossless() {
        let text = "One. Two words here! A longer sentence follows, with commas? End\n";
        let mut buffer = ChunkBuffer::new(5);
        let mut out = String::new();
        for piece in text.split_inclusive(' ') {
            if let Some(flushed) = buffer.push(piece) {
                out.push_str(&flushed);
            }
        }
        if let Some(rest) = buffer.finish() {
            out.push_str(&rest);
        }
        assert_eq!(out, text);
    }

    #[test]
    fn test_batcher_releases_at_threshold_or_newline() {
        let mut batcher = EventBatcher::new(10);
        assert_eq!(batcher.push("short"), None);
        assert_eq!(batcher.push("enough"), Some("shortenough".to_string()));
        assert_eq!(batcher.push("has\nnewline"), Some("has\nnewline".to_string()));
        assert_eq!(batcher.push("tail"), None);
        assert_eq!(batcher.finish(), Some("tail".to_string()));
    }
}
