//! Speech recognition using the Whisper API
//!
//! Supports multiple providers:
//! - OpenAI Whisper API
//! - Groq Whisper API (faster inference)
//! - Any OpenAI-compatible endpoint

use async_trait::async_trait;
use panda_core::{AudioClip, SpeechConfig, Transcriber, TranscribeError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, VoiceError};

/// Whisper API provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhisperProvider {
    /// OpenAI Whisper API
    OpenAi,
    /// Groq Whisper API (faster)
    Groq,
    /// Custom API endpoint
    Custom(String),
}

impl WhisperProvider {
    fn default_model(&self) -> &'static str {
        match self {
            WhisperProvider::Groq => "whisper-large-v3",
            WhisperProvider::OpenAi | WhisperProvider::Custom(_) => "whisper-1",
        }
    }
}

/// Configuration for Whisper client
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    pub api_key: String,
    pub provider: WhisperProvider,
    /// Model to use (e.g., "whisper-1", "whisper-large-v3")
    pub model: String,
    /// Prompt to guide transcription
    pub prompt: Option<String>,
    pub timeout_secs: u64,
}

impl WhisperConfig {
    fn with_provider(api_key: impl Into<String>, provider: WhisperProvider) -> Self {
        Self {
            api_key: api_key.into(),
            model: provider.default_model().to_string(),
            provider,
            prompt: None,
            timeout_secs: 60,
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::with_provider(api_key, WhisperProvider::OpenAi)
    }

    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::with_provider(api_key, WhisperProvider::Groq)
    }

    pub fn custom(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::with_provider(api_key, WhisperProvider::Custom(base_url.into()))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Build from the gateway's speech settings.
    ///
    /// Returns `Ok(None)` when no API key is set, which disables speech input.
    pub fn from_speech_config(config: &SpeechConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Ok(None);
        };

        let mut whisper = match (&config.base_url, config.provider.to_lowercase().as_str()) {
            (Some(url), _) => Self::custom(api_key, url.trim_end_matches('/')),
            (None, "openai") => Self::openai(api_key),
            (None, "groq") => Self::groq(api_key),
            (None, other) => {
                return Err(VoiceError::ConfigError(format!(
                    "Unknown speech provider '{}' (expected openai or groq)",
                    other
                )));
            }
        };
        if let Some(model) = &config.model {
            whisper = whisper.with_model(model.clone());
        }
        Ok(Some(whisper))
    }

    /// Get the API base URL for the provider
    pub fn base_url(&self) -> &str {
        match &self.provider {
            WhisperProvider::OpenAi => "https://api.openai.com/v1",
            WhisperProvider::Groq => "https://api.groq.com/openai/v1",
            WhisperProvider::Custom(url) => url,
        }
    }
}

/// Transcription result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    /// Language detected (if available)
    #[serde(default)]
    pub language: Option<String>,
    /// Duration in seconds (if available)
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Reduce a BCP-47 tag such as `en-US` to its ISO-639-1 code
pub fn iso_language(tag: &str) -> Option<String> {
    let primary = tag.trim().split(['-', '_']).next()?.to_ascii_lowercase();
    if primary.len() == 2 && primary.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(primary)
    } else {
        None
    }
}

/// Whisper client for speech recognition
#[derive(Clone)]
pub struct WhisperClient {
    client: Client,
    config: WhisperConfig,
}

impl WhisperClient {
    pub fn new(config: WhisperConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoiceError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Client for the gateway's speech settings, or `None` when disabled
    pub fn from_config(config: &SpeechConfig) -> Result<Option<Self>> {
        WhisperConfig::from_speech_config(config)?
            .map(Self::new)
            .transpose()
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }

    /// Transcribe an uploaded clip
    pub async fn transcribe_clip(
        &self,
        audio: &AudioClip,
        language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        let url = format!("{}/audio/transcriptions", self.config.base_url());

        info!(
            "Transcribing audio: {} bytes, filename: {}",
            audio.data.len(),
            audio.file_name
        );
        debug!("Using model: {}, provider: {:?}", self.config.model, self.config.provider);

        let file = reqwest::multipart::Part::bytes(audio.data.clone())
            .file_name(audio.file_name.clone())
            .mime_str(&audio.mime_type)
            .map_err(|e| VoiceError::InvalidFormat(format!("{}: {}", audio.mime_type, e)))?;

        let mut form = reqwest::multipart::Form::new()
            .text("model", self.config.model.clone())
            .text("response_format", "json")
            .part("file", file);

        if let Some(lang) = language.and_then(iso_language) {
            form = form.text("language", lang);
        }

        if let Some(ref prompt) = self.config.prompt {
            form = form.text("prompt", prompt.clone());
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VoiceError::ApiError { status, message });
        }

        let result: TranscriptionResult = response.json().await.map_err(|e| {
            VoiceError::RecognitionFailed(format!("Failed to parse response: {}", e))
        })?;

        info!(
            "Transcription complete: {} characters, language: {:?}",
            result.text.len(),
            result.language
        );

        Ok(result)
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(
        &self,
        audio: &AudioClip,
        language: &str,
    ) -> std::result::Result<String, TranscribeError> {
        let result = self.transcribe_clip(audio, Some(language)).await.map_err(|e| {
            warn!("Speech recognition failed: {}", e);
            TranscribeError::from(e)
        })?;

        let text = result.text.trim();
        if text.is_empty() {
            return Err(TranscribeError::CouldNotUnderstand);
        }
        Ok(text.to_string())
    }
}
