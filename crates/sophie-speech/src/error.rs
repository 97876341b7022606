use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("speech API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("transcode failed: {0}")]
    Transcode(String),

    #[error("ffmpeg not found: {0}")]
    FfmpegMissing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
