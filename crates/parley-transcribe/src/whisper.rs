//! Whisper transcription over the OpenAI-compatible audio API.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{info, warn};

use parley_core::{ParleyError, Result};

use crate::service::TranscriptionService;

pub struct WhisperApiService {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl WhisperApiService {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TranscriptionService for WhisperApiService {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        if audio.is_empty() {
            return Ok(String::new());
        }

        let form = Form::new()
            .text("model", self.model.clone())
            .text("response_format", "text")
            .part(
                "file",
                Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| ParleyError::Transcription(e.to_string()))?,
            );

        let url = format!("{}/v1/audio/transcriptions", self.base_url);
        let mut req = self.http.post(&url).multipart(form);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ParleyError::Transcription(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Transcription API error");
            return Err(ParleyError::Transcription(format!(
                "transcription API error {}: {}",
                status, body
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ParleyError::Transcription(e.to_string()))?;
        let text = text.trim().to_string();
        info!(chars = text.len(), "Transcription complete");
        Ok(text)
    }
}
