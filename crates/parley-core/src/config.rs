use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};

/// Top-level configuration for the Parley server.
///
/// Loaded from `~/.parley/config.toml` by default. Each section corresponds
/// to one subsystem. Secrets (API keys) are read from environment variables,
/// never from this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub general: GeneralConfig,
    pub llm: LlmConfig,
    pub tools: ToolsConfig,
    pub history: HistoryConfig,
    pub stream: StreamConfig,
    pub voice: VoiceConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            llm: LlmConfig::default(),
            tools: ToolsConfig::default(),
            history: HistoryConfig::default(),
            stream: StreamConfig::default(),
            voice: VoiceConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ParleyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Bind address for the HTTP server.
    pub host: String,
    /// Bind port for the HTTP server.
    pub port: u16,
    /// Data directory for the SQLite stores.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: "~/.parley/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// LLM completion service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible completion API.
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Transcription model identifier.
    pub transcription_model: String,
    /// Temperature for the tool-decision and synthesis calls.
    pub temperature: f32,
    /// Temperature for plain conversation (no tools).
    pub chat_temperature: f32,
    /// Token cap for synthesized answers.
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            transcription_model: "whisper-1".to_string(),
            temperature: 0.3,
            chat_temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

/// Retrieval tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Default number of image results.
    pub max_image_results: u32,
    /// Default number of news items.
    pub max_news_items: u32,
    /// Default number of web search results.
    pub num_web_results: u32,
    /// Per-call HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_image_results: 2,
            max_news_items: 3,
            num_web_results: 5,
            timeout_secs: 15,
        }
    }
}

/// Conversation history windowing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Rows read from the store when assembling context.
    pub read_limit: usize,
    /// Maximum non-system entries in the LLM context.
    pub context_limit: usize,
    /// History entries carried into the synthesis call.
    pub synthesis_history: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            read_limit: 10,
            context_limit: 20,
            synthesis_history: 5,
        }
    }
}

/// Output streaming settings shared by SSE and voice channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Minimum buffered bytes before a flush (unless punctuation forces one).
    pub min_flush_bytes: usize,
    /// Smaller flush threshold for post-tool synthesis streaming.
    pub synthesis_flush_bytes: usize,
    /// Batch size for the enhanced SSE endpoint.
    pub v2_batch_bytes: usize,
    /// Inactivity watchdog for the enhanced SSE endpoint, in seconds.
    pub inactivity_timeout_secs: u64,
    /// Pacing delay between flushed chunks, in milliseconds.
    pub pacing_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            min_flush_bytes: 8,
            synthesis_flush_bytes: 5,
            v2_batch_bytes: 100,
            inactivity_timeout_secs: 30,
            pacing_delay_ms: 10,
        }
    }
}

/// Voice endpointing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Consecutive silent chunks before end-of-recording auto-triggers.
    pub silence_threshold: u32,
    /// Maximum buffered chunks per recording.
    pub max_chunks: usize,
    /// Speech probability threshold for the VAD.
    pub vad_threshold: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 3,
            max_chunks: 512,
            vad_threshold: 0.5,
        }
    }
}

/// Per-address rolling-window rate limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Chat and transcription requests per minute.
    pub chat_per_minute: u32,
    /// History read requests per minute.
    pub reads_per_minute: u32,
    /// History delete requests per minute.
    pub deletes_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            chat_per_minute: 15,
            reads_per_minute: 30,
            deletes_per_minute: 10,
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
    fn test_default_config() {
        let config = ParleyConfig::default();
        assert_eq!(config.general.port, 8080);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert!((config.llm.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.history.context_limit, 20);
        assert_eq!(config.stream.min_flush_bytes, 8);
        assert_eq!(config.voice.silence_threshold, 3);
        assert_eq!(config.rate_limit.chat_per_minute, 15);
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = ParleyConfig::load_or_default(Path::new("/nonexistent/parley.toml"));
        assert_eq!(config.general.host, "127.0.0.1");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = ParleyConfig::default();
        config.general.port = 9999;
        config.voice.silence_threshold = 7;
        config.save(&path).unwrap();

        let loaded = ParleyConfig::load(&path).unwrap();
        assert_eq!(loaded.general.port, 9999);
        assert_eq!(loaded.voice.silence_threshold, 7);
    }

    #[test]
    fn test_partial_toml_uses_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general]\nport = 3000\n").unwrap();

        let loaded = ParleyConfig::load(&path).unwrap();
        assert_eq!(loaded.general.port, 3000);
        // Everything else falls back to defaults.
        assert_eq!(loaded.general.host, "127.0.0.1");
        assert_eq!(loaded.history.read_limit, 10);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "general = [[[").unwrap();

        let result = ParleyConfig::load(&path);
        assert!(matches!(result, Err(ParleyError::Config(_))));
    }
}
