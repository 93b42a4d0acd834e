//! Parley voice crate - audio endpointing for the voice channel.
//!
//! Inbound base64 WAV chunks accumulate in a bounded [`AudioSegment`];
//! per-chunk voice-activity detection drives a silence counter that decides
//! when the utterance is over. End-of-recording stitches the chunks into one
//! waveform and hands it to the transcription service.

pub mod endpointer;
pub mod segment;
pub mod vad;
pub mod wav;

pub use endpointer::{ChunkDecision, RecordingOutcome, VoiceEndpointer, VoiceSession};
pub use segment::AudioSegment;
pub use vad::{EnergyVad, VadModel, VoiceActivityDetector};
pub use wav::{decode_wav_chunk, encode_wav, DecodedAudio};
