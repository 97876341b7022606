//! Telegram channel adapter: a teloxide `Dispatcher` driving the message
//! handler over long polling. No webhook, so no public URL is needed.

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;

use sophie_agent::pipeline::TurnContext;
use sophie_core::config::TelegramConfig;

use crate::handler::handle_message;

/// Connects the turn pipeline to a Telegram bot account.
pub struct TelegramAdapter<C: TurnContext + 'static> {
    ctx: Arc<C>,
    config: TelegramConfig,
}

impl<C: TurnContext + 'static> TelegramAdapter<C> {
    pub fn new(config: &TelegramConfig, ctx: Arc<C>) -> Self {
        Self {
            ctx,
            config: config.clone(),
        }
    }

    /// Start polling and dispatch messages for the lifetime of the
    /// process. Does not return.
    pub async fn run(self) {
        let bot = Bot::new(&self.config.bot_token);
        info!("Telegram: starting long-polling dispatcher");

        let ctx = Arc::clone(&self.ctx);
        let config = self.config.clone();
        let handler = Update::filter_message().endpoint(handle_message::<C>);

        Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![ctx, config])
            .default_handler(|_upd| async {})
            .build()
            .dispatch()
            .await;
    }
}
