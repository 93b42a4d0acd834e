//! Voice-activity detection.
//!
//! The detection model is an owned resource with an explicit
//! load / ready / unload lifecycle, created once at startup and shared with
//! every voice connection.

use std::sync::RwLock;

use tracing::{debug, info};

use parley_core::{ParleyError, Result};

/// Per-chunk speech classification.
pub trait VoiceActivityDetector: Send + Sync {
    /// True if the chunk contains speech. Samples are mono f32 in [-1, 1].
    fn is_speech(&self, samples: &[f32], sample_rate: u32) -> bool;
}

/// RMS-energy detector. Classifies a chunk as speech when its root mean
/// square amplitude clears the threshold.
pub struct EnergyVad {
    threshold: f32,
}

impl EnergyVad {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn is_speech(&self, samples: &[f32], _sample_rate: u32) -> bool {
        if samples.is_empty() {
            return false;
        }
        let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        let rms = energy.sqrt();
        debug!(rms, threshold = self.threshold, "VAD energy");
        rms > self.threshold
    }
}

/// Process-wide VAD model handle.
///
/// Holds the detector between `load` and `unload`. Detection against an
/// unloaded model is an error, not a silent "no speech".
pub struct VadModel {
    detector: RwLock<Option<Box<dyn VoiceActivityDetector>>>,
}

impl VadModel {
    /// Create an unloaded handle.
    pub fn new() -> Self {
        Self {
            detector: RwLock::new(None),
        }
    }

    /// Create a handle that is already loaded.
    pub fn loaded(detector: Box<dyn VoiceActivityDetector>) -> Self {
        let model = Self::new();
        model.load(detector);
        model
    }

    pub fn load(&self, detector: Box<dyn VoiceActivityDetector>) {
        let mut slot = self.detector.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(detector);
        info!("VAD model loaded");
    }

    pub fn unload(&self) {
        let mut slot = self.detector.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
        info!("VAD model unloaded");
    }

    pub fn is_ready(&self) -> bool {
        self.detector
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Classify one decoded chunk.
    pub fn detect(&self, samples: &[f32], sample_rate: u32) -> Result<bool> {
        let slot = self.detector.read().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(detector) => Ok(detector.is_speech(samples, sample_rate)),
            None => Err(ParleyError::Voice("VAD model not loaded".to_string())),
        }
    }
}

impl Default for VadModel {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (i as f32 * 0.3).sin())
            .collect()
    }

    #[test]
    fn test_energy_vad_detects_loud_signal() {
        let vad = EnergyVad::new(0.05);
        assert!(vad.is_speech(&tone(0.5, 1600), 16000));
        assert!(!vad.is_speech(&tone(0.001, 1600), 16000));
    }

    #[test]
    fn test_energy_vad_empty_chunk_is_silence() {
        let vad = EnergyVad::new(0.05);
        assert!(!vad.is_speech(&[], 16000));
    }

    #[test]
    fn test_model_lifecycle() {
        let model = VadModel::new();
        assert!(!model.is_ready());
        assert!(model.detect(&[0.0], 16000).is_err());

        model.load(Box::new(EnergyVad::new(0.05)));
        assert!(model.is_ready());
        assert!(!model.detect(&tone(0.001, 100), 16000).unwrap());
        assert!(model.detect(&tone(0.5, 100), 16000).unwrap());

        model.unload();
        assert!(!model.is_ready());
        assert!(model.detect(&[0.0], 16000).is_err());
    }
}
