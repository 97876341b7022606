//! Speech bridge — the single entry point the turn pipeline uses for
//! voice input and output. Pure with respect to conversation state: it
//! never touches the history store.

use tracing::debug;

use crate::error::SpeechError;
use crate::stt::SttService;
use crate::transcode::AudioTranscoder;
use crate::tts::TtsService;

pub struct SpeechBridge {
    stt: Box<dyn SttService>,
    tts: Box<dyn TtsService>,
    transcoder: Box<dyn AudioTranscoder>,
    playback_speed: f32,
}

impl SpeechBridge {
    pub fn new(
        stt: Box<dyn SttService>,
        tts: Box<dyn TtsService>,
        transcoder: Box<dyn AudioTranscoder>,
        playback_speed: f32,
    ) -> Self {
        Self {
            stt,
            tts,
            transcoder,
            playback_speed,
        }
    }

    /// Transcribe an inbound voice note: transcode to canonical WAV, then
    /// run STT. `Ok(None)` is the normal "could not understand" outcome.
    pub async fn transcribe(
        &self,
        bytes: &[u8],
        container: &str,
        language_hint: &str,
    ) -> Result<Option<String>, SpeechError> {
        let wav = self.transcoder.to_wav(bytes, container).await?;
        let transcript = self.stt.transcribe(&wav, language_hint).await?;
        debug!(
            container,
            got_transcript = transcript.is_some(),
            "voice note transcribed"
        );
        Ok(transcript)
    }

    /// Synthesize a voice reply: TTS, then the deterministic playback
    /// speed-up post-process (configured multiplier, default 1.3).
    pub async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError> {
        let ogg = self.tts.synthesize(text, language).await?;
        self.transcoder.speed_up(&ogg, self.playback_speed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Transcoder double: passes audio through and tags speed-up output so
    /// tests can observe that the post-process ran.
    struct Passthrough;

    #[async_trait]
    impl AudioTranscoder for Passthrough {
        async fn to_wav(&self, bytes: &[u8], _container: &str) -> Result<Vec<u8>, SpeechError> {
            Ok(bytes.to_vec())
        }
        async fn speed_up(&self, ogg: &[u8], factor: f32) -> Result<Vec<u8>, SpeechError> {
            let mut out = ogg.to_vec();
            out.push(factor as u8);
            Ok(out)
        }
    }

    struct FixedStt(Option<String>);

    #[async_trait]
    impl SttService for FixedStt {
        async fn transcribe(
            &self,
            _wav: &[u8],
            _language_hint: &str,
        ) -> Result<Option<String>, SpeechError> {
            Ok(self.0.clone())
        }
    }

    struct FixedTts(Vec<u8>);

    #[async_trait]
    impl TtsService for FixedTts {
        async fn synthesize(&self, _text: &str, _language: &str) -> Result<Vec<u8>, SpeechError> {
            Ok(self.0.clone())
        }
    }

    fn bridge(stt: FixedStt, speed: f32) -> SpeechBridge {
        SpeechBridge::new(
            Box::new(stt),
            Box::new(FixedTts(vec![9, 9])),
            Box::new(Passthrough),
            speed,
        )
    }

    #[tokio::test]
    async fn empty_transcript_is_none_not_error() {
        let b = bridge(FixedStt(None), 1.3);
        let out = b.transcribe(&[1, 2, 3], "ogg", "en").await.unwrap();
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn transcript_passes_through() {
        let b = bridge(FixedStt(Some("hello".to_string())), 1.3);
        let out = b.transcribe(&[1, 2, 3], "ogg", "en").await.unwrap();
        assert_eq!(out.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn synthesize_applies_speed_post_process() {
        let b = bridge(FixedStt(None), 2.0);
        let out = b.synthesize("hi", "en").await.unwrap();
        // FixedTts yields [9, 9]; the passthrough speed-up appends the factor.
        assert_eq!(out, vec![9, 9, 2]);
    }
}
