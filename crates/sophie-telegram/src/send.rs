//! Outbound delivery for the Telegram adapter.
//!
//! Replies longer than one Telegram message are split at newline or space
//! boundaries. Each piece is sent as MarkdownV2 and re-sent as plain text
//! when Telegram rejects the formatting. Delivery failures are logged and
//! never retried here.

use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tracing::warn;

use sophie_agent::pipeline::ReplySink;

/// Telegram caps messages at 4096 characters; stay a little under.
const PIECE_MAX: usize = 4090;

/// Characters MarkdownV2 requires to be backslash-escaped.
const MDV2_SPECIALS: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Split `text` into pieces of at most `PIECE_MAX` characters. Prefers a
/// newline boundary, then a space, then cuts mid-word.
pub fn split_reply(text: &str) -> Vec<String> {
    if text.len() <= PIECE_MAX {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut rest = text;
    while rest.len() > PIECE_MAX {
        // The byte limit may land inside a multibyte character; back up to
        // the nearest char boundary before slicing.
        let mut end = PIECE_MAX;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let window = &rest[..end];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .unwrap_or(end);
        pieces.push(rest[..cut].to_string());
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Backslash-escape everything MarkdownV2 treats as syntax.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        if MDV2_SPECIALS.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Deliver `text` to `chat_id`, split into pieces as needed.
///
/// Consecutive pieces are spaced 100ms apart to stay under Telegram's
/// per-chat rate limit.
pub async fn send_response(bot: &Bot, chat_id: ChatId, text: &str) {
    let pieces = split_reply(text);
    let last = pieces.len() - 1;
    for (i, piece) in pieces.iter().enumerate() {
        let markdown = bot
            .send_message(chat_id, escape_markdown_v2(piece))
            .parse_mode(ParseMode::MarkdownV2)
            .await;

        if markdown.is_err() {
            if let Err(e) = bot.send_message(chat_id, piece).await {
                warn!(error = %e, piece = i, "Telegram: plain-text send failed");
            }
        }

        if i < last {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Per-chat reply sink handed to the turn pipeline.
pub struct TelegramSink {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramSink {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }
}

#[async_trait]
impl ReplySink for TelegramSink {
    async fn send_text(&self, text: &str) {
        send_response(&self.bot, self.chat_id, text).await;
    }

    async fn send_voice(&self, ogg: Vec<u8>) {
        let note = InputFile::memory(ogg).file_name("reply.ogg");
        if let Err(e) = self.bot.send_voice(self.chat_id, note).await {
            warn!(chat_id = %self.chat_id, error = %e, "Telegram: voice send failed");
        }
    }
}
