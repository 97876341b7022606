//! One pass of the turn state machine:
//! received → (transcribe) → history read → complete → persist → deliver.
//!
//! Every failure path resolves to at most one user-visible message and a
//! `TurnOutcome`; nothing escapes to the caller. The hosting adapter can
//! therefore spawn turns freely without one chat's error taking down the
//! process.

use tracing::{error, info, warn};

use sophie_core::types::{InboundKind, InboundMessage, InboundUtterance};
use sophie_history::types::TurnRole;

use crate::provider::{ChatMessage, CompletionRequest, Role};

use super::context::{ReplySink, TurnContext};

/// Reply when STT produced no usable transcript.
pub const COULD_NOT_UNDERSTAND: &str = "Could not understand audio. Please try again.";
/// Reply to voice notes when no speech services are configured.
pub const VOICE_UNAVAILABLE: &str =
    "Voice processing is currently unavailable. Please send text messages instead.";
/// Single generic apology for completion or unknown failures.
pub const GENERIC_APOLOGY: &str = "Sorry, I encountered an error processing your message.";

const DOCUMENT_PREAMBLE: &str = "Here's a document I'd like you to analyze:";

/// What a finished turn did — used for logging and tests. `reply` is the
/// assistant text that was delivered, `None` when the turn ended on an
/// error path.
#[derive(Debug)]
pub struct TurnOutcome {
    pub reply: Option<String>,
    pub user_persisted: bool,
    pub assistant_persisted: bool,
}

impl TurnOutcome {
    fn aborted() -> Self {
        Self {
            reply: None,
            user_persisted: false,
            assistant_persisted: false,
        }
    }
}

/// Process one inbound message end to end.
///
/// The store and the speech/completion services are all allowed to fail
/// without failing the turn, except the completion call itself: when that
/// fails after retries the user gets a single apology and no assistant
/// turn is persisted.
pub async fn run_turn<C: TurnContext>(
    ctx: &C,
    inbound: InboundMessage,
    sink: &dyn ReplySink,
) -> TurnOutcome {
    let chat_id = inbound.chat_id.clone();

    // Effective language: the channel's explicit locale wins, else the
    // chat's stored preference (cached, "en" for unseen chats).
    let language = inbound
        .user_locale
        .clone()
        .unwrap_or_else(|| ctx.history().language_of(&chat_id));

    let utterance = match resolve_utterance(ctx, &inbound, &language, sink).await {
        Some(u) => u,
        // The user has already been told what went wrong.
        None => return TurnOutcome::aborted(),
    };

    // History is read before the user turn is appended, so the window
    // never contains the message being answered.
    let history = match ctx.history().recent(&chat_id, ctx.history_limit()) {
        Ok(h) => h,
        Err(e) => {
            warn!(chat_id = %chat_id, error = %e, "history read failed; continuing with empty context");
            Vec::new()
        }
    };

    let mut messages: Vec<ChatMessage> = history
        .iter()
        .map(|h| ChatMessage {
            role: match h.role {
                TurnRole::User => Role::User,
                TurnRole::Assistant => Role::Assistant,
            },
            content: h.content.clone(),
        })
        .collect();
    messages.push(ChatMessage {
        role: Role::User,
        content: utterance.text.clone(),
    });

    let request = CompletionRequest {
        model: ctx.model().to_string(),
        system: ctx.system_prompt().to_string(),
        messages,
        max_tokens: ctx.max_tokens(),
    };

    // Persist the user turn and call the completion service concurrently.
    // The store assigns timestamps at write time and the assistant append
    // below runs only after both branches resolve, so the store always
    // orders user before assistant within a turn.
    let (user_append, completion) = tokio::join!(
        async {
            ctx.history()
                .append(&chat_id, TurnRole::User, &utterance.text, &utterance.language)
        },
        ctx.completer().complete(&request),
    );

    let user_persisted = match user_append {
        Ok(()) => true,
        Err(e) => {
            warn!(chat_id = %chat_id, error = %e, "failed to persist user turn; continuing");
            false
        }
    };

    let reply = match completion {
        Ok(text) => text,
        Err(e) => {
            error!(chat_id = %chat_id, error = %e, "completion failed after retries");
            sink.send_text(GENERIC_APOLOGY).await;
            return TurnOutcome {
                reply: None,
                user_persisted,
                assistant_persisted: false,
            };
        }
    };

    let assistant_persisted = match ctx.history().append(
        &chat_id,
        TurnRole::Assistant,
        &reply,
        &utterance.language,
    ) {
        Ok(()) => true,
        Err(e) => {
            warn!(chat_id = %chat_id, error = %e, "failed to persist assistant turn; continuing");
            false
        }
    };

    // Deliver text and voice as independent branches: the text reply is
    // never gated on synthesis latency, and a voice failure never
    // suppresses the text (or vice versa).
    let text_branch = sink.send_text(&reply);
    let voice_branch = async {
        if let Some(bridge) = ctx.speech() {
            match bridge.synthesize(&reply, &utterance.language).await {
                Ok(ogg) => sink.send_voice(ogg).await,
                Err(e) => {
                    warn!(chat_id = %chat_id, error = %e, "voice synthesis failed; text reply stands")
                }
            }
        }
    };
    tokio::join!(text_branch, voice_branch);

    info!(
        chat_id = %chat_id,
        source = %utterance.source,
        reply_len = reply.len(),
        "turn complete"
    );

    TurnOutcome {
        reply: Some(reply),
        user_persisted,
        assistant_persisted,
    }
}

/// Converge text, document and voice payloads into one `InboundUtterance`.
///
/// Returns `None` when the turn cannot proceed (no transcript, voice not
/// configured); the user-visible outcome has been delivered already.
async fn resolve_utterance<C: TurnContext>(
    ctx: &C,
    inbound: &InboundMessage,
    language: &str,
    sink: &dyn ReplySink,
) -> Option<InboundUtterance> {
    match &inbound.kind {
        InboundKind::Text(text) => Some(InboundUtterance::text(&inbound.chat_id, text, language)),

        InboundKind::Document(bytes) => {
            let body = String::from_utf8_lossy(bytes);
            let text = format!("{DOCUMENT_PREAMBLE}\n\n{body}");
            Some(InboundUtterance::text(&inbound.chat_id, &text, language))
        }

        InboundKind::Voice { bytes, container } => {
            let Some(bridge) = ctx.speech() else {
                sink.send_text(VOICE_UNAVAILABLE).await;
                return None;
            };
            match bridge.transcribe(bytes, container, language).await {
                Ok(Some(transcript)) => Some(InboundUtterance::voice(
                    &inbound.chat_id,
                    &transcript,
                    language,
                )),
                Ok(None) => {
                    info!(chat_id = %inbound.chat_id, "voice note produced no usable transcript");
                    sink.send_text(COULD_NOT_UNDERSTAND).await;
                    None
                }
                Err(e) => {
                    warn!(chat_id = %inbound.chat_id, error = %e, "transcription failed");
                    sink.send_text(COULD_NOT_UNDERSTAND).await;
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use sophie_history::error::HistoryError;
    use sophie_history::store::HistoryStore;
    use sophie_history::types::HistoryEntry;
    use sophie_speech::{AudioTranscoder, SpeechBridge, SpeechError, SttService, TtsService};

    use crate::provider::{CompletionError, CompletionProvider};

    // --- doubles ---------------------------------------------------------

    #[derive(Clone)]
    struct MemStore {
        turns: Arc<Mutex<Vec<(String, TurnRole, String, String)>>>,
    }

    impl MemStore {
        fn new() -> Self {
            Self {
                turns: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl HistoryStore for MemStore {
        fn append(
            &self,
            chat_id: &str,
            role: TurnRole,
            content: &str,
            language: &str,
        ) -> Result<(), HistoryError> {
            self.turns.lock().unwrap().push((
                chat_id.to_string(),
                role,
                content.to_string(),
                language.to_string(),
            ));
            Ok(())
        }

        fn recent(&self, chat_id: &str, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
            let turns = self.turns.lock().unwrap();
            let mut entries: Vec<HistoryEntry> = turns
                .iter()
                .filter(|(c, ..)| c == chat_id)
                .map(|(_, role, content, _)| HistoryEntry {
                    role: *role,
                    content: content.clone(),
                })
                .collect();
            let skip = entries.len().saturating_sub(limit);
            Ok(entries.split_off(skip))
        }

        fn language_of(&self, _chat_id: &str) -> String {
            "en".to_string()
        }
    }

    struct BrokenStore;

    impl HistoryStore for BrokenStore {
        fn append(&self, _: &str, _: TurnRole, _: &str, _: &str) -> Result<(), HistoryError> {
            Err(HistoryError::Unavailable("connection refused".to_string()))
        }
        fn recent(&self, _: &str, _: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
            Err(HistoryError::Unavailable("connection refused".to_string()))
        }
        fn language_of(&self, _: &str) -> String {
            "en".to_string()
        }
    }

    /// Returns a fixed reply, or a 503 on every call when `reply` is None.
    struct StubCompleter {
        reply: Option<String>,
        calls: Arc<AtomicU32>,
    }

    impl StubCompleter {
        fn ok(reply: &str) -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Self {
                    reply: Some(reply.to_string()),
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
        fn failing() -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Self {
                    reply: None,
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl CompletionProvider for StubCompleter {
        fn name(&self) -> &str {
            "stub"
        }
        async fn complete(&self, _req: &CompletionRequest) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(r) => Ok(r.clone()),
                None => Err(CompletionError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        texts: Mutex<Vec<String>>,
        voices: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl ReplySink for RecordingSink {
        async fn send_text(&self, text: &str) {
            self.texts.lock().unwrap().push(text.to_string());
        }
        async fn send_voice(&self, ogg: Vec<u8>) {
            self.voices.lock().unwrap().push(ogg);
        }
    }

    struct StubStt(Option<String>);

    #[async_trait]
    impl SttService for StubStt {
        async fn transcribe(&self, _: &[u8], _: &str) -> Result<Option<String>, SpeechError> {
            Ok(self.0.clone())
        }
    }

    struct StubTts;

    #[async_trait]
    impl TtsService for StubTts {
        async fn synthesize(&self, _: &str, _: &str) -> Result<Vec<u8>, SpeechError> {
            Ok(vec![7, 7, 7])
        }
    }

    struct PassTranscode;

    #[async_trait]
    impl AudioTranscoder for PassTranscode {
        async fn to_wav(&self, bytes: &[u8], _: &str) -> Result<Vec<u8>, SpeechError> {
            Ok(bytes.to_vec())
        }
        async fn speed_up(&self, ogg: &[u8], _: f32) -> Result<Vec<u8>, SpeechError> {
            Ok(ogg.to_vec())
        }
    }

    fn bridge_with_stt(stt: StubStt) -> SpeechBridge {
        SpeechBridge::new(
            Box::new(stt),
            Box::new(StubTts),
            Box::new(PassTranscode),
            1.3,
        )
    }

    struct TestContext {
        store: Box<dyn HistoryStore>,
        completer: Box<dyn CompletionProvider>,
        speech: Option<SpeechBridge>,
    }

    impl TurnContext for TestContext {
        fn history(&self) -> &dyn HistoryStore {
            self.store.as_ref()
        }
        fn completer(&self) -> &dyn CompletionProvider {
            self.completer.as_ref()
        }
        fn speech(&self) -> Option<&SpeechBridge> {
            self.speech.as_ref()
        }
        fn bot_name(&self) -> &str {
            "Sophie"
        }
        fn system_prompt(&self) -> &str {
            "You are Sophie, a friendly and helpful assistant."
        }
        fn model(&self) -> &str {
            "test-model"
        }
        fn max_tokens(&self) -> u32 {
            64
        }
        fn history_limit(&self) -> usize {
            10
        }
    }

    fn text_message(chat_id: &str, text: &str) -> InboundMessage {
        InboundMessage {
            chat_id: chat_id.to_string(),
            kind: InboundKind::Text(text.to_string()),
            user_locale: Some("en".to_string()),
        }
    }

    // --- scenarios -------------------------------------------------------

    #[tokio::test]
    async fn fresh_chat_persists_both_turns_and_delivers_text_and_voice() {
        let store = MemStore::new();
        let turns = Arc::clone(&store.turns);
        let (completer, _) = StubCompleter::ok("I don't have weather access.");
        let ctx = TestContext {
            store: Box::new(store),
            completer: Box::new(completer),
            speech: Some(bridge_with_stt(StubStt(None))),
        };
        let sink = RecordingSink::default();

        let outcome = run_turn(&ctx, text_message("42", "What's the weather?"), &sink).await;

        assert_eq!(outcome.reply.as_deref(), Some("I don't have weather access."));
        assert!(outcome.user_persisted);
        assert!(outcome.assistant_persisted);

        let turns = turns.lock().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].1, TurnRole::User);
        assert_eq!(turns[0].2, "What's the weather?");
        assert_eq!(turns[1].1, TurnRole::Assistant);
        assert_eq!(turns[1].2, "I don't have weather access.");
        assert!(turns.iter().all(|(c, ..)| c == "42"));

        assert_eq!(
            sink.texts.lock().unwrap().as_slice(),
            ["I don't have weather access."]
        );
        // Voice reply delivered independently of the text.
        assert_eq!(sink.voices.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn store_failure_degrades_but_text_is_still_delivered() {
        let (completer, _) = StubCompleter::ok("Still here.");
        let ctx = TestContext {
            store: Box::new(BrokenStore),
            completer: Box::new(completer),
            speech: None,
        };
        let sink = RecordingSink::default();

        let outcome = run_turn(&ctx, text_message("42", "hello"), &sink).await;

        assert_eq!(outcome.reply.as_deref(), Some("Still here."));
        assert!(!outcome.user_persisted);
        assert!(!outcome.assistant_persisted);
        assert_eq!(sink.texts.lock().unwrap().as_slice(), ["Still here."]);
    }

    #[tokio::test]
    async fn completion_failure_sends_one_apology_and_persists_no_assistant_turn() {
        let store = MemStore::new();
        let turns = Arc::clone(&store.turns);
        let (completer, _) = StubCompleter::failing();
        let ctx = TestContext {
            store: Box::new(store),
            completer: Box::new(completer),
            speech: Some(bridge_with_stt(StubStt(None))),
        };
        let sink = RecordingSink::default();

        let outcome = run_turn(&ctx, text_message("42", "hello"), &sink).await;

        assert_eq!(outcome.reply, None);
        assert!(!outcome.assistant_persisted);
        // The user turn was already persisted when the completion failed.
        let turns = turns.lock().unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].1, TurnRole::User);

        assert_eq!(sink.texts.lock().unwrap().as_slice(), [GENERIC_APOLOGY]);
        // No voice reply is attempted on the failure path.
        assert!(sink.voices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unintelligible_voice_note_short_circuits_before_completion() {
        let (completer, calls) = StubCompleter::ok("should never be sent");
        let ctx = TestContext {
            store: Box::new(MemStore::new()),
            completer: Box::new(completer),
            speech: Some(bridge_with_stt(StubStt(None))),
        };
        let sink = RecordingSink::default();

        let inbound = InboundMessage {
            chat_id: "42".to_string(),
            kind: InboundKind::Voice {
                bytes: vec![1, 2, 3],
                container: "ogg".to_string(),
            },
            user_locale: None,
        };
        let outcome = run_turn(&ctx, inbound, &sink).await;

        assert_eq!(outcome.reply, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.texts.lock().unwrap().as_slice(), [COULD_NOT_UNDERSTAND]);
    }

    #[tokio::test]
    async fn transcribed_voice_note_flows_through_the_text_path() {
        let store = MemStore::new();
        let turns = Arc::clone(&store.turns);
        let (completer, _) = StubCompleter::ok("Hello to you too.");
        let ctx = TestContext {
            store: Box::new(store),
            completer: Box::new(completer),
            speech: Some(bridge_with_stt(StubStt(Some("hello there".to_string())))),
        };
        let sink = RecordingSink::default();

        let inbound = InboundMessage {
            chat_id: "42".to_string(),
            kind: InboundKind::Voice {
                bytes: vec![1, 2, 3],
                container: "ogg".to_string(),
            },
            user_locale: Some("en".to_string()),
        };
        let outcome = run_turn(&ctx, inbound, &sink).await;

        assert_eq!(outcome.reply.as_deref(), Some("Hello to you too."));
        let turns = turns.lock().unwrap();
        assert_eq!(turns[0].2, "hello there");
    }

    #[tokio::test]
    async fn voice_note_without_speech_services_gets_unavailable_notice() {
        let (completer, calls) = StubCompleter::ok("unused");
        let ctx = TestContext {
            store: Box::new(MemStore::new()),
            completer: Box::new(completer),
            speech: None,
        };
        let sink = RecordingSink::default();

        let inbound = InboundMessage {
            chat_id: "42".to_string(),
            kind: InboundKind::Voice {
                bytes: vec![1],
                container: "ogg".to_string(),
            },
            user_locale: None,
        };
        run_turn(&ctx, inbound, &sink).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.texts.lock().unwrap().as_slice(), [VOICE_UNAVAILABLE]);
    }

    #[tokio::test]
    async fn document_payload_becomes_analyze_prompt() {
        let store = MemStore::new();
        let turns = Arc::clone(&store.turns);
        let (completer, _) = StubCompleter::ok("Summary.");
        let ctx = TestContext {
            store: Box::new(store),
            completer: Box::new(completer),
            speech: None,
        };
        let sink = RecordingSink::default();

        let inbound = InboundMessage {
            chat_id: "42".to_string(),
            kind: InboundKind::Document(b"quarterly report".to_vec()),
            user_locale: Some("en".to_string()),
        };
        run_turn(&ctx, inbound, &sink).await;

        let turns = turns.lock().unwrap();
        assert!(turns[0].2.starts_with(DOCUMENT_PREAMBLE));
        assert!(turns[0].2.contains("quarterly report"));
    }
}
