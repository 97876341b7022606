//! "Typing…" indicator shown while a turn is being processed.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatAction;
use tokio::task::JoinHandle;

/// Telegram drops the typing status after roughly five seconds, so the
/// refresh period stays under that.
const REFRESH_PERIOD: Duration = Duration::from_secs(4);

/// Keeps a chat's typing indicator alive until stopped.
pub struct TypingHandle {
    task: JoinHandle<()>,
}

impl TypingHandle {
    /// Show the indicator for `chat_id` immediately and keep refreshing it.
    pub fn start(bot: Bot, chat_id: ChatId) -> Self {
        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(REFRESH_PERIOD);
            loop {
                tick.tick().await;
                if bot
                    .send_chat_action(chat_id, ChatAction::Typing)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        Self { task }
    }

    /// Clear the indicator by cancelling the refresh loop.
    pub fn stop(self) {
        self.task.abort();
    }
}
