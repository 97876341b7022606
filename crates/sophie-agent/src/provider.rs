use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single message in the completion context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Request to the completion service: system prompt, chronological prior
/// turns, and the new user message already appended as the final entry.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

/// Common interface for completion backends and their wrappers.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Send a completion request, wait for the generated text.
    async fn complete(&self, req: &CompletionRequest) -> Result<String, CompletionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("empty user message")]
    EmptyMessage,
}

impl CompletionError {
    /// Whether a retry with the same payload could plausibly succeed.
    /// Timeouts, rate limits and 5xx responses are transient; malformed
    /// requests and other 4xx responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Parse(_) => false,
            Self::EmptyMessage => false,
        }
    }
}
