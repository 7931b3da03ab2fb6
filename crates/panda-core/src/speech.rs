//! Speech-to-text seam

use async_trait::async_trait;

use crate::error::TranscribeError;

/// Uploaded audio plus what the client told us about it
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub data: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

impl AudioClip {
    pub fn new(data: Vec<u8>, file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Speech recognition collaborator
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe `audio` spoken in `language` (a BCP-47 tag such as `en-US`)
    async fn transcribe(&self, audio: &AudioClip, language: &str) -> Result<String, TranscribeError>;
}
