//! Telegram message handler registered in the teloxide Dispatcher.

use std::sync::Arc;

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileMeta;
use tracing::{debug, warn};

use sophie_agent::pipeline::{run_turn, TurnContext};
use sophie_core::config::TelegramConfig;
use sophie_core::types::{InboundKind, InboundMessage};

use crate::send::{self, TelegramSink};
use crate::typing::TypingHandle;

/// Main message handler, run for every incoming `Message`.
///
/// 1. Bot-message filter
/// 2. `/start` greeting
/// 3. Payload extraction (text, voice note download, document download)
/// 4. Non-blocking turn pipeline invocation with a typing indicator
pub async fn handle_message<C: TurnContext + 'static>(
    bot: Bot,
    msg: Message,
    ctx: Arc<C>,
    config: TelegramConfig,
) -> ResponseResult<()> {
    // Ignore messages from other bots.
    if msg.from.as_ref().map(|u| u.is_bot).unwrap_or(false) {
        return Ok(());
    }

    let chat_id = msg.chat.id;
    let user_locale = msg.from.as_ref().and_then(|u| u.language_code.clone());

    let text = msg.text().or(msg.caption()).unwrap_or("").to_string();
    if text.trim().eq_ignore_ascii_case("/start") {
        send::send_response(&bot, chat_id, &greeting(ctx.bot_name())).await;
        return Ok(());
    }

    let kind = if let Some(voice) = msg.voice() {
        // Telegram voice notes are Ogg/Opus; trust the mime subtype when
        // present since it doubles as the transcoder's demuxer name.
        let container = voice
            .mime_type
            .as_ref()
            .map(|m| m.subtype().as_str().to_string())
            .unwrap_or_else(|| "ogg".to_string());
        match download_bytes(&bot, &voice.file, config.max_attachment_bytes).await {
            Ok(bytes) => InboundKind::Voice { bytes, container },
            Err(e) => {
                send::send_response(&bot, chat_id, download_notice(&e)).await;
                return Ok(());
            }
        }
    } else if let Some(doc) = msg.document() {
        match download_bytes(&bot, &doc.file, config.max_attachment_bytes).await {
            Ok(bytes) => InboundKind::Document(bytes),
            Err(e) => {
                send::send_response(&bot, chat_id, download_notice(&e)).await;
                return Ok(());
            }
        }
    } else if !text.is_empty() {
        InboundKind::Text(text)
    } else {
        // Stickers, photos, location pins — nothing the bot handles.
        return Ok(());
    };

    let inbound = InboundMessage {
        chat_id: chat_id.0.to_string(),
        kind,
        user_locale,
    };

    // Run the turn in a separate task so the dispatcher keeps receiving.
    let ctx2 = Arc::clone(&ctx);
    let bot2 = bot.clone();
    tokio::spawn(async move {
        let typing = TypingHandle::start(bot2.clone(), chat_id);
        let sink = TelegramSink::new(bot2, chat_id);
        let outcome = run_turn(ctx2.as_ref(), inbound, &sink).await;
        typing.stop();
        if outcome.reply.is_none() {
            debug!(chat_id = %chat_id, "turn ended without an assistant reply");
        }
    });

    Ok(())
}

fn greeting(bot_name: &str) -> String {
    format!("Hi! I'm {bot_name}. Send me messages, voice notes or documents!")
}

/// Why an attachment could not be fetched. The user gets a short notice
/// either way; the distinction only changes its wording.
#[derive(Debug, PartialEq, Eq)]
enum DownloadError {
    TooLarge,
    Failed,
}

fn download_notice(err: &DownloadError) -> &'static str {
    match err {
        DownloadError::TooLarge => "That file is too large for me to process.",
        DownloadError::Failed => sophie_agent::pipeline::turn::GENERIC_APOLOGY,
    }
}

/// Download a Telegram file, enforcing the configured size cap.
async fn download_bytes(
    bot: &Bot,
    file: &FileMeta,
    max_bytes: u64,
) -> Result<Vec<u8>, DownloadError> {
    let meta = match bot.get_file(file.id.as_str()).await {
        Ok(f) => f,
        Err(e) => {
            warn!(file_id = %file.id, error = %e, "Telegram: get_file failed");
            return Err(DownloadError::Failed);
        }
    };

    if u64::from(meta.size) > max_bytes {
        warn!(
            file_id = %file.id,
            size = meta.size,
            limit = max_bytes,
            "Telegram: file exceeds size limit, skipping"
        );
        return Err(DownloadError::TooLarge);
    }

    let mut buf: Vec<u8> = Vec::new();
    if let Err(e) = bot.download_file(&meta.path, &mut buf).await {
        warn!(file_id = %file.id, error = %e, "Telegram: download_file failed");
        return Err(DownloadError::Failed);
    }
    Ok(buf)
}
