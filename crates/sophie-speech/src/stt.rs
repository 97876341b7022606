//! Speech-to-text client.
//!
//! Talks to an OpenAI-compatible `/v1/audio/transcriptions` endpoint.
//! An empty or whitespace-only transcript is a normal "could not
//! understand" outcome and maps to `Ok(None)`, never an error.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::SpeechError;

/// Speech-to-text service interface.
#[async_trait]
pub trait SttService: Send + Sync {
    /// Transcribe canonical WAV audio. `Ok(None)` means the service
    /// produced no usable transcript.
    async fn transcribe(
        &self,
        wav: &[u8],
        language_hint: &str,
    ) -> Result<Option<String>, SpeechError>;
}

/// HTTP STT client for OpenAI-compatible transcription endpoints.
pub struct HttpSttClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpSttClient {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
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
        })
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait]
impl SttService for HttpSttClient {
    async fn transcribe(
        &self,
        wav: &[u8],
        language_hint: &str,
    ) -> Result<Option<String>, SpeechError> {
        let url = format!("{}/v1/audio/transcriptions", self.base_url);
        debug!(model = %self.model, wav_len = wav.len(), "sending transcription request");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")?,
            )
            .text("model", self.model.clone())
            .text("language", language_hint.to_string());

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SpeechError::Api { status, message });
        }

        let parsed: TranscriptionResponse = resp.json().await?;
        let trimmed = parsed.text.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }
}
