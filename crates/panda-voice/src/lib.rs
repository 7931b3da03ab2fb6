//! panda-voice: Speech recognition for the PandaLora gateway
//!
//! Provides a Whisper API client that plugs into the core chat service as
//! its `Transcriber`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use panda_voice::{WhisperClient, WhisperConfig};
//!
//! let client = WhisperClient::new(WhisperConfig::groq("your-api-key"))?;
//! let chat = chat.with_transcriber(Arc::new(client));
//! ```

pub mod error;
pub mod whisper;

pub use error::{Result, VoiceError};
pub use whisper::{TranscriptionResult, WhisperClient, WhisperConfig, WhisperProvider, iso_language};
