use serde::{Deserialize, Serialize};
use std::fmt;

/// Fallback language tag used when a chat has no recorded preference.
pub const DEFAULT_LANGUAGE: &str = "en";

/// One message received from the channel adapter, before any processing.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: String,
    pub kind: InboundKind,
    /// Locale reported by the channel for the sender (IETF tag), if any.
    pub user_locale: Option<String>,
}

/// Payload variants the bot accepts from a channel.
#[derive(Debug, Clone)]
pub enum InboundKind {
    Text(String),
    /// Raw voice-note bytes in the channel's native container (e.g. "ogg").
    Voice { bytes: Vec<u8>, container: String },
    /// Document bytes, read as UTF-8 text downstream.
    Document(Vec<u8>),
}

/// Where an utterance originated. Text and voice converge into the same
/// value type before reaching the turn pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtteranceSource {
    Text,
    Voice,
}

impl fmt::Display for UtteranceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Voice => write!(f, "voice"),
        }
    }
}

/// A normalized user utterance, constructed exactly once per inbound
/// message regardless of origin (typed, transcribed, or document text).
#[derive(Debug, Clone)]
pub struct InboundUtterance {
    pub chat_id: String,
    pub text: String,
    /// Effective language for this turn (IETF tag).
    pub language: String,
    pub source: UtteranceSource,
}

impl InboundUtterance {
    pub fn text(chat_id: &str, text: &str, language: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            language: language.to_string(),
            source: UtteranceSource::Text,
        }
    }

    pub fn voice(chat_id: &str, transcript: &str, language: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            text: transcript.to_string(),
            language: language.to_string(),
            source: UtteranceSource::Voice,
        }
    }
}
