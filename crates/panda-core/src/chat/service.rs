//! Chat orchestrator
//!
//! Sequences one exchange: resolve input, load history, record the user
//! message, generate through the stream coordinator, record the assistant
//! message. Generation failures never escape; the log always gets a
//! user message followed by an assistant message.

use std::sync::Arc;

use tracing::info;

use crate::chat::exchange::{ChatResult, Exchange, ExchangeState, InputType};
use crate::config::ChatConfig;
use crate::error::{Error, GenerationError, Result, TranscribeError};
use crate::llm::{Generator, PromptContext};
use crate::session::{ConversationId, Message, Role, SessionStore};
use crate::speech::{AudioClip, Transcriber};
use crate::stream::{self, CollectSink, FrameSink, Producer, RunStatus, StreamOutcome};

/// Assistant reply recorded when generation fails
pub const FALLBACK_RESPONSE: &str = "Oops! I had a little brain hiccup there. As a panda, \
    sometimes I get distracted by thoughts of bamboo! Could you try asking me again?";

/// Assistant reply recorded when no model API key is configured
pub const NOT_CONFIGURED_RESPONSE: &str = "I'm sorry, but I'm not properly configured to \
    connect to my AI brain right now. Please check that the GEMINI_API_KEY is set up correctly.";

/// Language assumed when a speech request does not name one
pub const DEFAULT_LANGUAGE: &str = "en-US";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Single,
    Streaming,
}

/// Protocol-agnostic chat surface used by every transport
pub struct ChatService {
    store: Arc<SessionStore>,
    generator: Arc<dyn Generator>,
    transcriber: Option<Arc<dyn Transcriber>>,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(store: Arc<SessionStore>, generator: Arc<dyn Generator>, config: ChatConfig) -> Self {
        Self {
            store,
            generator,
            transcriber: None,
            config,
        }
    }

    /// Enable speech input
    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn supports_speech(&self) -> bool {
        self.transcriber.is_some()
    }

    pub fn new_conversation(&self) -> ConversationId {
        self.store.create_conversation()
    }

    pub fn history(&self, id: &ConversationId) -> Result<Vec<Message>> {
        self.store.history(id)
    }

    /// Non-streaming text exchange
    pub async fn handle_text_exchange(
        &self,
        conversation_id: Option<ConversationId>,
        text: &str,
    ) -> Result<ChatResult> {
        let mut exchange = Exchange::start(InputType::Text, conversation_id.clone());
        let text = self
            .validate_text(text)
            .map_err(|e| exchange.fail(e))?;
        exchange.advance(ExchangeState::InputResolved);

        let mut sink = CollectSink::new();
        self.complete_exchange(exchange, conversation_id, text, Mode::Single, &mut sink)
            .await
    }

    /// Streaming text exchange; frames go to `sink` as they are generated
    pub async fn handle_streaming_exchange<S>(
        &self,
        conversation_id: Option<ConversationId>,
        text: &str,
        sink: &mut S,
    ) -> Result<ChatResult>
    where
        S: FrameSink + ?Sized,
    {
        let mut exchange = Exchange::start(InputType::Text, conversation_id.clone());
        let text = self
            .validate_text(text)
            .map_err(|e| exchange.fail(e))?;
        exchange.advance(ExchangeState::InputResolved);

        self.complete_exchange(exchange, conversation_id, text, Mode::Streaming, sink)
            .await
    }

    /// Speech exchange: transcribe, then continue as a text exchange
    ///
    /// Audio that cannot be understood fails with `InvalidAudio` and records
    /// nothing.
    pub async fn handle_speech_exchange(
        &self,
        conversation_id: Option<ConversationId>,
        audio: &AudioClip,
        language: &str,
    ) -> Result<ChatResult> {
        let mut exchange = Exchange::start(InputType::Speech, conversation_id.clone());

        let text = self
            .transcribe(audio, language)
            .await
            .map_err(|e| exchange.fail(e))?;
        exchange.advance(ExchangeState::InputResolved);
        info!("Speech converted to text: {}", text);

        let mut sink = CollectSink::new();
        self.complete_exchange(exchange, conversation_id, text, Mode::Single, &mut sink)
            .await
    }

    async fn transcribe(&self, audio: &AudioClip, language: &str) -> Result<String> {
        if audio.is_empty() {
            return Err(Error::InvalidInput("audio file is empty".to_string()));
        }
        let transcriber = self.transcriber.as_ref().ok_or_else(|| {
            Error::UpstreamUnavailable("speech recognition is not configured".to_string())
        })?;

        let language = match language.trim() {
            "" => DEFAULT_LANGUAGE,
            tag => tag,
        };
        let text = transcriber.transcribe(audio, language).await?;

        let text = text.trim();
        if text.is_empty() {
            return Err(TranscribeError::CouldNotUnderstand.into());
        }
        self.validate_text(text)
    }

    /// Trimmed user text, or `InvalidInput` when empty or too long
    pub fn validate_text(&self, text: &str) -> Result<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("text must not be empty".to_string()));
        }
        if trimmed.chars().count() > self.config.max_input_chars {
            return Err(Error::InvalidInput(format!(
                "text longer than {} characters",
                self.config.max_input_chars
            )));
        }
        Ok(trimmed.to_string())
    }

    async fn complete_exchange<S>(
        &self,
        mut exchange: Exchange,
        conversation_id: Option<ConversationId>,
        text: String,
        mode: Mode,
        sink: &mut S,
    ) -> Result<ChatResult>
    where
        S: FrameSink + ?Sized,
    {
        let conversation_id = conversation_id.unwrap_or_else(|| self.store.create_conversation());
        exchange.bind(&conversation_id);

        let history = self
            .store
            .history(&conversation_id)
            .map_err(|e| exchange.fail(e))?;
        exchange.advance(ExchangeState::HistoryLoaded);

        self.store
            .append(&conversation_id, Role::User, text.as_str())
            .map_err(|e| exchange.fail(e))?;
        exchange.advance(ExchangeState::UserAppended);

        let ctx = PromptContext::new(
            self.config.system_prompt.as_str(),
            &history,
            self.config.context_window,
            text,
        );
        let producer = match mode {
            Mode::Single => {
                let generator = Arc::clone(&self.generator);
                Producer::single(async move { generator.generate(&ctx).await })
            }
            Mode::Streaming => Producer::stream(self.generator.generate_stream(ctx)),
        };
        exchange.advance(ExchangeState::Generating);

        let outcome = stream::run(producer, &conversation_id, sink).await;
        let response = assistant_reply(outcome, mode);

        self.store
            .append(&conversation_id, Role::Assistant, response.as_str())
            .map_err(|e| exchange.fail(e))?;
        exchange.advance(ExchangeState::AssistantAppended);
        exchange.advance(ExchangeState::Done);

        let processing_time_ms = exchange.elapsed_ms();
        info!(
            "Exchange complete: conversation={}, input={:?}, {} chars in {}ms",
            conversation_id,
            exchange.input_type(),
            response.len(),
            processing_time_ms
        );

        Ok(ChatResult {
            response,
            conversation_id,
            input_type: exchange.input_type(),
            processing_time_ms,
        })
    }
}

/// Choose the assistant message to record for a finished run
fn assistant_reply(outcome: StreamOutcome, mode: Mode) -> String {
    match outcome.status {
        RunStatus::Completed if mode == Mode::Single => outcome.text.trim().to_string(),
        RunStatus::Completed | RunStatus::ConsumerGone => outcome.text,
        RunStatus::Failed(err) if outcome.text.is_empty() => fallback_for(&err).to_string(),
        RunStatus::Failed(_) => outcome.text,
    }
}

fn fallback_for(err: &GenerationError) -> &'static str {
    match err {
        GenerationError::NotConfigured => NOT_CONFIGURED_RESPONSE,
        _ => FALLBACK_RESPONSE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ChannelSink, ChunkStream, PushStatus, StreamFrame};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Generator replaying fixed output and recording what it was asked
    struct ScriptedGenerator {
        reply: std::result::Result<String, GenerationError>,
        chunks: Vec<std::result::Result<String, GenerationError>>,
        delay: Duration,
        seen: Mutex<Vec<PromptContext>>,
    }

    impl ScriptedGenerator {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                chunks: vec![Ok(reply.to_string())],
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: GenerationError) -> Self {
            Self {
                reply: Err(err.clone()),
                chunks: vec![Err(err)],
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn streaming(chunks: &[&str]) -> Self {
            Self {
                reply: Ok(chunks.concat()),
                chunks: chunks.iter().map(|c| Ok(c.to_string())).collect(),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, ctx: &PromptContext) -> std::result::Result<String, GenerationError> {
            self.seen.lock().unwrap().push(ctx.clone());
            tokio::time::sleep(self.delay).await;
            self.reply.clone()
        }

        fn generate_stream(&self, ctx: PromptContext) -> ChunkStream {
            self.seen.lock().unwrap().push(ctx);
            futures::stream::iter(self.chunks.clone()).boxed()
        }
    }

    struct StubTranscriber(std::result::Result<String, TranscribeError>);

    #[async_trait]
    impl Transcriber for StubTranscriber {
        async fn transcribe(
            &self,
            _audio: &AudioClip,
            _language: &str,
        ) -> std::result::Result<String, TranscribeError> {
            self.0.clone()
        }
    }

    /// Accepts one frame, then reports the client as gone
    struct OneFrameSink {
        frames: Vec<StreamFrame>,
    }

    #[async_trait]
    impl FrameSink for OneFrameSink {
        async fn push(&mut self, frame: StreamFrame) -> PushStatus {
            if self.frames.is_empty() {
                self.frames.push(frame);
                PushStatus::Delivered
            } else {
                PushStatus::ConsumerGone
            }
        }

        fn is_open(&self) -> bool {
            self.frames.is_empty()
        }
    }

    fn service(generator: ScriptedGenerator) -> (ChatService, Arc<ScriptedGenerator>) {
        let generator = Arc::new(generator);
        let service = ChatService::new(
            Arc::new(SessionStore::new()),
            generator.clone(),
            ChatConfig::default(),
        );
        (service, generator)
    }

    fn clip() -> AudioClip {
        AudioClip::new(vec![1, 2, 3], "voice.webm", "audio/webm")
    }

    #[tokio::test]
    async fn test_text_exchange_records_both_turns() {
        let (service, _) = service(ScriptedGenerator::replying("  Hello from the grove!  "));

        let result = service.handle_text_exchange(None, "Hi panda").await.unwrap();

        assert_eq!(result.response, "Hello from the grove!");
        assert_eq!(result.input_type, InputType::Text);
        let history = service.history(&result.conversation_id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "Hi panda");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Hello from the grove!");
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_mutation() {
        let (service, generator) = service(ScriptedGenerator::replying("unused"));
        let id = ConversationId::parse("existing").unwrap();

        let err = service
            .handle_text_exchange(Some(id.clone()), "   ")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(service.history(&id).unwrap().is_empty());
        assert_eq!(service.store().conversation_count(), 0);
        assert!(generator.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overlong_text_rejected() {
        let (service, _) = service(ScriptedGenerator::replying("unused"));
        let text = "a".repeat(service.config().max_input_chars + 1);

        let err = service.handle_text_exchange(None, &text).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_generation_failure_records_fallback() {
        let (service, _) = service(ScriptedGenerator::failing(GenerationError::Api(
            "500 internal".into(),
        )));

        let result = service.handle_text_exchange(None, "Hello?").await.unwrap();

        assert_eq!(result.response, FALLBACK_RESPONSE);
        let history = service.history(&result.conversation_id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Hello?");
        assert_eq!(history[1].content, FALLBACK_RESPONSE);
    }

    #[tokio::test]
    async fn test_unconfigured_generator_apologizes() {
        let (service, _) = service(ScriptedGenerator::failing(GenerationError::NotConfigured));

        let result = service.handle_text_exchange(None, "Hello?").await.unwrap();
        assert_eq!(result.response, NOT_CONFIGURED_RESPONSE);
    }

    #[tokio::test]
    async fn test_streaming_exchange_frames_and_history() {
        let (service, _) = service(ScriptedGenerator::streaming(&["Hel", "lo"]));
        let id = service.new_conversation();
        let (mut sink, mut rx) = ChannelSink::channel(8);

        let result = service
            .handle_streaming_exchange(Some(id.clone()), "greet me", &mut sink)
            .await
            .unwrap();
        drop(sink);

        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        assert_eq!(
            frames,
            vec![
                StreamFrame::chunk(id.clone(), "Hel"),
                StreamFrame::chunk(id.clone(), "lo"),
                StreamFrame::done(id.clone()),
            ]
        );
        assert_eq!(result.response, "Hello");
        assert_eq!(service.history(&id).unwrap()[1].content, "Hello");
    }

    #[tokio::test]
    async fn test_streaming_disconnect_records_partial() {
        let (service, _) = service(ScriptedGenerator::streaming(&["Hel", "lo"]));
        let id = service.new_conversation();
        let mut sink = OneFrameSink { frames: Vec::new() };

        let result = service
            .handle_streaming_exchange(Some(id.clone()), "greet me", &mut sink)
            .await
            .unwrap();

        assert_eq!(result.response, "Hel");
        assert_eq!(sink.frames.len(), 1);
        let history = service.history(&id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Hel");
    }

    #[tokio::test]
    async fn test_streaming_failure_sends_error_frame() {
        let (service, _) = service(ScriptedGenerator::failing(GenerationError::Transport(
            "reset".into(),
        )));
        let mut sink = CollectSink::new();

        let result = service
            .handle_streaming_exchange(None, "Hello?", &mut sink)
            .await
            .unwrap();

        assert_eq!(result.response, FALLBACK_RESPONSE);
        let frames = sink.frames();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_error && frames[0].is_final);
        assert_eq!(service.history(&result.conversation_id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_context_window_limits_prompt_history() {
        let (service, generator) = service(ScriptedGenerator::replying("ok"));
        let id = service.new_conversation();
        for i in 0..7 {
            service
                .handle_text_exchange(Some(id.clone()), &format!("turn {}", i))
                .await
                .unwrap();
        }

        let seen = generator.seen.lock().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(last.history.len(), 10);
        assert_eq!(last.history[0].content, "turn 1");
        assert_eq!(last.user_text, "turn 6");
        assert_eq!(service.history(&id).unwrap().len(), 14);
    }

    #[tokio::test]
    async fn test_speech_not_understood_records_nothing() {
        let (service, _) = service(ScriptedGenerator::replying("unused"));
        let service = service.with_transcriber(Arc::new(StubTranscriber(Err(
            TranscribeError::CouldNotUnderstand,
        ))));
        let id = service.new_conversation();

        let err = service
            .handle_speech_exchange(Some(id.clone()), &clip(), "en-US")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidAudio(_)));
        assert!(service.history(&id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_speech_service_error_is_upstream_unavailable() {
        let (service, _) = service(ScriptedGenerator::replying("unused"));
        let service = service.with_transcriber(Arc::new(StubTranscriber(Err(
            TranscribeError::ServiceError("quota".into()),
        ))));

        let err = service
            .handle_speech_exchange(None, &clip(), "en-US")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_blank_transcript_is_invalid_audio() {
        let (service, _) = service(ScriptedGenerator::replying("unused"));
        let service = service.with_transcriber(Arc::new(StubTranscriber(Ok("  ".into()))));

        let err = service
            .handle_speech_exchange(None, &clip(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAudio(_)));
    }

    #[tokio::test]
    async fn test_speech_exchange_uses_transcript() {
        let (service, generator) = service(ScriptedGenerator::replying("Bamboo is great"));
        let service =
            service.with_transcriber(Arc::new(StubTranscriber(Ok("Do you like bamboo?".into()))));

        let result = service
            .handle_speech_exchange(None, &clip(), "en-US")
            .await
            .unwrap();

        assert_eq!(result.input_type, InputType::Speech);
        assert_eq!(result.response, "Bamboo is great");
        let history = service.history(&result.conversation_id).unwrap();
        assert_eq!(history[0].content, "Do you like bamboo?");
        assert_eq!(
            generator.seen.lock().unwrap()[0].user_text,
            "Do you like bamboo?"
        );
    }

    #[tokio::test]
    async fn test_speech_without_transcriber() {
        let (service, _) = service(ScriptedGenerator::replying("unused"));
        assert!(!service.supports_speech());

        let err = service
            .handle_speech_exchange(None, &clip(), "en-US")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_audio_is_invalid_input() {
        let (service, _) = service(ScriptedGenerator::replying("unused"));
        let service = service.with_transcriber(Arc::new(StubTranscriber(Ok("hi".into()))));
        let empty = AudioClip::new(Vec::new(), "voice.wav", "audio/wav");

        let err = service
            .handle_speech_exchange(None, &empty, "en-US")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_closed_store_fails_exchange() {
        let (service, _) = service(ScriptedGenerator::replying("unused"));
        service.store().close();

        let err = service.handle_text_exchange(None, "Hi").await.unwrap_err();
        assert!(matches!(err, Error::StoreClosed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_exchanges_same_conversation() {
        let mut generator = ScriptedGenerator::replying("reply");
        generator.delay = Duration::from_millis(20);
        let (service, generator) = service(generator);
        let service = Arc::new(service);
        let id = ConversationId::parse("shared-conversation").unwrap();

        let a = {
            let service = Arc::clone(&service);
            let id = id.clone();
            tokio::spawn(async move { service.handle_text_exchange(Some(id), "first").await })
        };
        let b = {
            let service = Arc::clone(&service);
            let id = id.clone();
            tokio::spawn(async move { service.handle_text_exchange(Some(id), "second").await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let history = service.history(&id).unwrap();
        assert_eq!(history.len(), 4);
        let sequences: Vec<u64> = history.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
        assert_eq!(history.iter().filter(|m| m.is_user()).count(), 2);
        assert!(history[0].is_user());

        // Each exchange saw a snapshot of the log that precedes its own turn
        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        for ctx in seen.iter() {
            assert!(ctx.history.len() < history.len());
            assert_eq!(ctx.history.as_slice(), &history[..ctx.history.len()]);
            assert!(!ctx.history.iter().any(|m| m.content == ctx.user_text));
        }
    }
}
