//! Text-to-speech client.
//!
//! Talks to an OpenAI-compatible `/v1/audio/speech` endpoint and requests
//! Ogg/Opus output — the canonical voice-note container for messaging
//! channels.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::SpeechError;

/// Text-to-speech service interface.
#[async_trait]
pub trait TtsService: Send + Sync {
    /// Synthesize `text` into Ogg/Opus bytes.
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError>;
}

/// HTTP TTS client for OpenAI-compatible speech endpoints.
pub struct HttpTtsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
}

impl HttpTtsClient {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        voice: String,
        timeout_secs: u64,
    ) -> Result<Self, SpeechError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model,
            voice,
        })
    }
}

#[async_trait]
impl TtsService for HttpTtsClient {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError> {
        let url = format!("{}/v1/audio/speech", self.base_url);
        debug!(model = %self.model, text_len = text.len(), language, "sending speech request");

        let body = serde_json::json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
            "response_format": "opus",
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SpeechError::Api { status, message });
        }

        Ok(resp.bytes().await?.to_vec())
    }
}
