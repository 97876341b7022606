//! Process-wide application context handed to the Telegram adapter.

use sophie_agent::pipeline::TurnContext;
use sophie_agent::provider::CompletionProvider;
use sophie_core::config::SophieConfig;
use sophie_history::store::{ConversationStore, HistoryStore};
use sophie_speech::SpeechBridge;

/// Owns every long-lived collaborator: the conversation store, the
/// retrying completion client, and the optional speech bridge.
pub struct AppContext {
    config: SophieConfig,
    store: ConversationStore,
    completer: Box<dyn CompletionProvider>,
    speech: Option<SpeechBridge>,
}

impl AppContext {
    pub fn new(
        config: SophieConfig,
        store: ConversationStore,
        completer: Box<dyn CompletionProvider>,
        speech: Option<SpeechBridge>,
    ) -> Self {
        Self {
            config,
            store,
            completer,
            speech,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }
}

impl TurnContext for AppContext {
    fn history(&self) -> &dyn HistoryStore {
        &self.store
    }

    fn completer(&self) -> &dyn CompletionProvider {
        self.completer.as_ref()
    }

    fn speech(&self) -> Option<&SpeechBridge> {
        self.speech.as_ref()
    }

    fn bot_name(&self) -> &str {
        &self.config.bot.name
    }

    fn system_prompt(&self) -> &str {
        &self.config.bot.personality
    }

    fn model(&self) -> &str {
        &self.config.anthropic.model
    }

    fn max_tokens(&self) -> u32 {
        self.config.anthropic.max_tokens
    }

    fn history_limit(&self) -> usize {
        self.config.history.limit
    }
}
