//! Error types for panda-voice

use panda_core::TranscribeError;
use reqwest::StatusCode;
use thiserror::Error;

/// panda-voice error type
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Speech recognition failed: {0}")]
    RecognitionFailed(String),

    #[error("API error {status}: {message}")]
    ApiError { status: StatusCode, message: String },

    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<VoiceError> for TranscribeError {
    fn from(err: VoiceError) -> Self {
        match err {
            // Whisper answers 400 for audio it cannot decode
            VoiceError::ApiError { status, .. } if status == StatusCode::BAD_REQUEST => {
                TranscribeError::CouldNotUnderstand
            }
            VoiceError::InvalidFormat(_) => TranscribeError::CouldNotUnderstand,
            other => TranscribeError::ServiceError(other.to_string()),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, VoiceError>;
