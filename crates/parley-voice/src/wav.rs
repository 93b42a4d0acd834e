//! WAV decode/encode for voice chunks.
//!
//! Clients send base64-encoded WAV chunks. Each chunk is decoded
//! independently, downmixed to mono, and normalized to f32 samples;
//! end-of-recording re-encodes the concatenated waveform as one
//! 16-bit mono WAV for transcription.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use parley_core::{ParleyError, Result};

/// One decoded chunk: mono samples plus the chunk's sample rate.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode a base64 WAV chunk to mono f32 samples.
pub fn decode_wav_chunk(data_b64: &str) -> Result<DecodedAudio> {
    let bytes = BASE64
        .decode(data_b64)
        .map_err(|e| ParleyError::Audio(format!("invalid base64 audio: {}", e)))?;
    decode_wav_bytes(&bytes)
}

/// Decode raw WAV bytes to mono f32 samples.
pub fn decode_wav_bytes(bytes: &[u8]) -> Result<DecodedAudio> {
    let mut reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| ParleyError::Audio(format!("invalid WAV chunk: {}", e)))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| ParleyError::Audio(format!("corrupt WAV samples: {}", e)))?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| ParleyError::Audio(format!("corrupt WAV samples: {}", e)))?
        }
    };

    Ok(DecodedAudio {
        samples: downmix(&interleaved, channels),
        sample_rate: spec.sample_rate,
    })
}

/// Average interleaved channels down to mono.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Encode mono f32 samples as a 16-bit PCM WAV.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| ParleyError::Audio(format!("WAV encode failed: {}", e)))?;
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer
                .write_sample((clamped * i16::MAX as f32) as i16)
                .map_err(|e| ParleyError::Audio(format!("WAV encode failed: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| ParleyError::Audio(format!("WAV encode failed: {}", e)))?;
    }
    Ok(cursor.into_inner())
}

/// Encode then base64 a chunk, for tests and clients.
pub fn encode_wav_base64(samples: &[f32], sample_rate: u32) -> Result<String> {
    Ok(BASE64.encode(encode_wav(samples, sample_rate)?))
}

// =============================================================================
// Tests
// =============================================================================
