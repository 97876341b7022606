use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

mod app;

use app::AppContext;

/// How often expired turns are purged from the database.
const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sophie=info,sophie_bot=info".into()),
        )
        .init();

    // load config: SOPHIE_CONFIG env > ~/.sophie/sophie.toml
    let config_path = std::env::var("SOPHIE_CONFIG").ok();
    let config = sophie_core::config::SophieConfig::load(config_path.as_deref())?;

    // initialize SQLite database
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    sophie_history::db::init_db(&db)?;
    info!("database migrations complete");

    let store =
        sophie_history::store::ConversationStore::new(db, config.history.retention_days);

    // completion client: Anthropic wrapped in linear-backoff retry
    let provider = sophie_agent::anthropic::AnthropicProvider::new(&config.anthropic)?;
    info!(
        model = %config.anthropic.model,
        base_url = %config.anthropic.base_url,
        "completion provider: Anthropic"
    );
    let policy = sophie_agent::retry::RetryPolicy::new(
        config.retry.max_attempts,
        Duration::from_millis(config.retry.base_delay_ms),
    );
    let completer = Box::new(sophie_agent::retry::RetryingCompleter::new(
        Box::new(provider),
        policy,
    ));

    let speech = build_speech(&config).await?;

    let ctx = Arc::new(AppContext::new(config.clone(), store, completer, speech));

    // hourly retention sweep
    let purge_ctx = Arc::clone(&ctx);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match purge_ctx.store().purge_expired() {
                Ok(0) => {}
                Ok(n) => info!(removed = n, "purged expired conversation turns"),
                Err(e) => warn!(error = %e, "retention purge failed"),
            }
        }
    });

    let adapter = sophie_telegram::TelegramAdapter::new(&config.telegram, ctx);
    info!("Sophie is starting");
    adapter.run().await;

    Ok(())
}

/// Build the speech bridge when both STT and TTS endpoints are configured.
///
/// Requires a working `ffmpeg` on PATH; a missing binary is a startup
/// error rather than a per-message surprise.
async fn build_speech(
    config: &sophie_core::config::SophieConfig,
) -> anyhow::Result<Option<sophie_speech::SpeechBridge>> {
    let (stt_cfg, tts_cfg) = match (&config.speech.stt, &config.speech.tts) {
        (Some(s), Some(t)) => (s, t),
        _ => {
            info!("speech services not configured — voice disabled");
            return Ok(None);
        }
    };

    let transcoder = sophie_speech::transcode::FfmpegTranscoder::new();
    transcoder.probe().await?;

    let stt = sophie_speech::stt::HttpSttClient::new(
        stt_cfg.base_url.clone(),
        stt_cfg.api_key.clone(),
        stt_cfg.model.clone(),
        stt_cfg.timeout_secs,
    )?;
    let tts = sophie_speech::tts::HttpTtsClient::new(
        tts_cfg.base_url.clone(),
        tts_cfg.api_key.clone(),
        tts_cfg.model.clone(),
        tts_cfg.voice.clone(),
        tts_cfg.timeout_secs,
    )?;

    info!(
        stt = %stt_cfg.base_url,
        tts = %tts_cfg.base_url,
        playback_speed = config.speech.playback_speed,
        "speech services configured"
    );

    Ok(Some(sophie_speech::SpeechBridge::new(
        Box::new(stt),
        Box::new(tts),
        Box::new(transcoder),
        config.speech.playback_speed,
    )))
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
