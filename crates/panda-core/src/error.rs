//! Error types for panda-core

use thiserror::Error;

/// Main error type for panda-core
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing input, rejected before any state mutation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Audio was received but nothing intelligible could be extracted
    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    /// Transcription or generation service is down or unconfigured
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The session store has been torn down
    #[error("Session store is closed")]
    StoreClosed,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for panda-core
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a speech-to-text collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscribeError {
    #[error("Could not understand the audio")]
    CouldNotUnderstand,

    #[error("Speech recognition service error: {0}")]
    ServiceError(String),
}

impl From<TranscribeError> for Error {
    fn from(e: TranscribeError) -> Self {
        match e {
            TranscribeError::CouldNotUnderstand => Error::InvalidAudio(e.to_string()),
            TranscribeError::ServiceError(_) => Error::UpstreamUnavailable(e.to_string()),
        }
    }
}

/// Failure reported by a text generation collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// No API key configured for the model
    #[error("generation model is not configured")]
    NotConfigured,

    /// Non-success response from the model API
    #[error("model API error: {0}")]
    Api(String),

    /// Transport failure or malformed response body
    #[error("model request failed: {0}")]
    Transport(String),
}
