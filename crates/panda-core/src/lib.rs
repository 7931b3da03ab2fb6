//! panda-core: PandaLora Gateway Core Library
//!
//! Conversation storage, response streaming, chat orchestration and the
//! collaborator traits (generation, speech) every transport builds on.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod session;
pub mod speech;
pub mod stream;

pub use chat::{ChatResult, ChatService, InputType};
pub use config::{ChatConfig, Config, LlmConfig, ServerConfig, SpeechConfig, WsConfig};
pub use error::{Error, GenerationError, Result, TranscribeError};
pub use llm::{GeminiClient, Generator, PromptContext};
pub use session::{ConversationId, Message, Role, SessionStore};
pub use speech::{AudioClip, Transcriber};
pub use stream::{ChannelSink, FrameSink, PushStatus, StreamFrame};
