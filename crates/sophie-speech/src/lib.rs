pub mod bridge;
pub mod error;
pub mod stt;
pub mod transcode;
pub mod tts;

pub use bridge::SpeechBridge;
pub use error::SpeechError;
pub use stt::{HttpSttClient, SttService};
pub use transcode::{AudioTranscoder, FfmpegTranscoder};
pub use tts::{HttpTtsClient, TtsService};
