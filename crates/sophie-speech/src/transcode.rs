//! Audio container conversion via ffmpeg subprocesses.
//!
//! All conversions run as piped `ffmpeg` child processes so the async
//! scheduler is never blocked on CPU-bound codec work. Input is written to
//! the child's stdin from a spawned task while stdout is collected, which
//! avoids the classic pipe deadlock on large payloads.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::SpeechError;

/// Canonical STT input: 16 kHz mono signed 16-bit WAV.
const STT_SAMPLE_RATE: &str = "16000";

/// Audio conversion seam. The production implementation shells out to
/// ffmpeg; tests substitute a passthrough double.
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    /// Convert inbound audio in `container` (ffmpeg demuxer name, e.g.
    /// "ogg") to the canonical WAV format expected by the STT service.
    async fn to_wav(&self, bytes: &[u8], container: &str) -> Result<Vec<u8>, SpeechError>;

    /// Speed up an Ogg/Opus voice note by `factor` without changing pitch.
    /// A factor of 1.0 is a pass-through.
    async fn speed_up(&self, ogg: &[u8], factor: f32) -> Result<Vec<u8>, SpeechError>;
}

/// ffmpeg-backed transcoder.
pub struct FfmpegTranscoder {
    command: String,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            command: "ffmpeg".to_string(),
        }
    }

    /// Verify that ffmpeg is runnable. Called once at startup — a missing
    /// binary is a fatal configuration error, not a per-turn failure.
    pub async fn probe(&self) -> Result<(), SpeechError> {
        let status = Command::new(&self.command)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| SpeechError::FfmpegMissing(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(SpeechError::FfmpegMissing(format!(
                "`{} -version` exited with {status}",
                self.command
            )))
        }
    }

    /// Run ffmpeg with `args`, feeding `input` on stdin and collecting
    /// stdout as the converted payload.
    async fn run(&self, args: &[&str], input: &[u8]) -> Result<Vec<u8>, SpeechError> {
        let mut child = Command::new(&self.command)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SpeechError::Transcode("ffmpeg stdin unavailable".to_string()))?;
        let payload = input.to_vec();
        let writer = tokio::spawn(async move {
            let _ = stdin.write_all(&payload).await;
            // stdin drops here, closing the pipe so ffmpeg sees EOF.
        });

        let output = child.wait_with_output().await?;
        let _ = writer.await;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpeechError::Transcode(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn to_wav(&self, bytes: &[u8], container: &str) -> Result<Vec<u8>, SpeechError> {
        debug!(container, input_len = bytes.len(), "transcoding to wav");
        self.run(
            &[
                "-f", container, "-i", "pipe:0", "-ar", STT_SAMPLE_RATE, "-ac", "1", "-f", "wav",
                "pipe:1",
            ],
            bytes,
        )
        .await
    }

    async fn speed_up(&self, ogg: &[u8], factor: f32) -> Result<Vec<u8>, SpeechError> {
        if (factor - 1.0).abs() < f32::EPSILON {
            return Ok(ogg.to_vec());
        }
        // atempo accepts 0.5–100.0; the configured speed multiplier is
        // always within range in practice (default 1.3).
        let tempo = format!("atempo={factor}");
        debug!(factor, input_len = ogg.len(), "adjusting playback speed");
        self.run(
            &[
                "-f", "ogg", "-i", "pipe:0", "-filter:a", &tempo, "-c:a", "libopus", "-f", "ogg",
                "pipe:1",
            ],
            ogg,
        )
        .await
    }
}
