use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (sophie.toml + SOPHIE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SophieConfig {
    #[serde(default)]
    pub bot: BotConfig,
    pub telegram: TelegramConfig,
    pub anthropic: AnthropicConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
}

/// Bot identity injected into the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,
    #[serde(default = "default_personality")]
    pub personality: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            personality: default_personality(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Largest voice note / document the bot will download, in bytes.
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Conversation history window and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Number of recent turns sent as completion context.
    #[serde(default = "default_history_limit")]
    pub limit: usize,
    /// Turns older than this are expired.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: default_history_limit(),
            retention_days: default_retention_days(),
        }
    }
}

/// Retry policy for the completion client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first (not "retries after").
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Linear backoff base: attempt n sleeps n * base_delay_ms.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// Speech services (STT + TTS) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    pub stt: Option<SttConfig>,
    pub tts: Option<TtsConfig>,
    /// Voice replies are sped up by this factor after synthesis.
    #[serde(default = "default_playback_speed")]
    pub playback_speed: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt: None,
            tts: None,
            playback_speed: default_playback_speed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_stt_model")]
    pub model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_tts_model")]
    pub model: String,
    #[serde(default = "default_tts_voice")]
    pub voice: String,
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_bot_name() -> String {
    "Sophie".to_string()
}
fn default_personality() -> String {
    "You are Sophie, a friendly and helpful assistant.".to_string()
}
fn default_max_attachment_bytes() -> u64 {
    20 * 1024 * 1024
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_history_limit() -> usize {
    10
}
fn default_retention_days() -> i64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_playback_speed() -> f32 {
    1.3
}
fn default_stt_model() -> String {
    "whisper-1".to_string()
}
fn default_tts_model() -> String {
    "tts-1".to_string()
}
fn default_tts_voice() -> String {
    "alloy".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.sophie/sophie.db", home)
}

impl SophieConfig {
    /// Load config from a TOML file with SOPHIE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.sophie/sophie.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: SophieConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SOPHIE_").split("_"))
            .extract()
            .map_err(|e| crate::error::SophieError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.sophie/sophie.toml", home)
}
