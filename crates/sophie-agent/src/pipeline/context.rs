//! Shared context interface for channel adapters.
//!
//! `TurnContext` is the single trait every channel host must implement.
//! All collaborators are exposed behind narrow trait objects so tests can
//! substitute doubles for the store, the completion client, and (via
//! `SpeechBridge` construction) the speech services.

use async_trait::async_trait;

use sophie_history::store::HistoryStore;
use sophie_speech::SpeechBridge;

use crate::provider::CompletionProvider;

/// Minimal context interface required by the turn pipeline.
pub trait TurnContext: Send + Sync {
    fn history(&self) -> &dyn HistoryStore;

    /// Completion client. In production this is the retrying wrapper, so
    /// the pipeline never sees transient failures that a retry absorbs.
    fn completer(&self) -> &dyn CompletionProvider;

    /// Speech bridge, when voice is configured. `None` disables voice
    /// input and output; text turns still work.
    fn speech(&self) -> Option<&SpeechBridge>;

    /// Display name used in greetings (e.g. the /start reply).
    fn bot_name(&self) -> &str;

    fn system_prompt(&self) -> &str;
    fn model(&self) -> &str;
    fn max_tokens(&self) -> u32;

    /// Number of recent turns sent as completion context.
    fn history_limit(&self) -> usize;
}

/// Outbound delivery for one chat. Fire-and-forget: implementations log
/// delivery failures and never surface them to the pipeline.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send_text(&self, text: &str);
    async fn send_voice(&self, ogg: Vec<u8>);
}
