//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables
//! 2. `pandalora.toml` (or the file passed on the command line)
//! 3. Defaults
//!
//! `${VAR_NAME}` inside the config file is replaced with the environment value.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::Error;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "pandalora.toml";

/// Generation model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Gemini API key (empty = not configured)
    pub api_key: String,
    /// Model to use
    pub model: String,
    /// Base URL (optional, for proxies and tests)
    pub base_url: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            base_url: None,
            timeout_secs: 120,
        }
    }
}

fn default_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}

/// Speech recognition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// API key; speech input is disabled without one
    pub api_key: Option<String>,
    /// Provider name: "openai" or "groq"
    pub provider: String,
    /// Model override
    pub model: Option<String>,
    /// Custom endpoint (takes precedence over provider)
    pub base_url: Option<String>,
    /// Language tag used when the client does not send one
    pub default_language: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: "openai".to_string(),
            model: None,
            base_url: None,
            default_language: "en-US".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. If unset, any origin is allowed.
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: None,
        }
    }
}

/// Conversation and prompt configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Persona prompt placed ahead of every transcript
    pub system_prompt: String,
    /// Number of recent messages sent to the model
    pub context_window: usize,
    /// Messages retained per conversation
    pub max_messages: usize,
    /// Longest accepted user input, in characters
    pub max_input_chars: usize,
    /// Frames buffered between the generator and a streaming client
    pub stream_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            context_window: 10,
            max_messages: 50,
            max_input_chars: 4000,
            stream_buffer: 16,
        }
    }
}

fn default_system_prompt() -> String {
    "You are a friendly, wise, and playful talking panda named gothicco bambinipanda or 'gbp' \
     for short. You love to help users with their questions and provide thoughtful, engaging \
     responses. You have a warm personality and occasionally reference your love for bamboo, \
     nature, and peaceful living. Keep your responses conversational and friendly, but also \
     informative and helpful. You can discuss any topic but always maintain your panda \
     personality."
        .to_string()
}

/// WebSocket configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    /// Close the connection after this many consecutive failed exchanges (0 = never)
    pub max_consecutive_errors: u32,
}

/// Main configuration for the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub speech: SpeechConfig,
    pub server: ServerConfig,
    pub chat: ChatConfig,
    pub ws: WsConfig,
}

impl Config {
    /// Replace `${VAR_NAME}` with the environment value (empty if unset)
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                } else if !var_name.is_empty() {
                    warn!("Config references unset environment variable: {}", var_name);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Parse TOML text, expanding environment references
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded = Self::expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load a TOML config file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&content)?;
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Load from `path`, or `pandalora.toml` if present, or the environment
    pub fn load(path: Option<&str>) -> crate::Result<Self> {
        match path {
            Some(path) => Self::from_toml_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_toml_file(DEFAULT_CONFIG_FILE),
            None => Self::from_env(),
        }
    }

    /// Override settings from environment variables
    pub fn apply_env_overrides(&mut self) -> crate::Result<()> {
        if let Some(key) = env_non_empty("GEMINI_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(model) = env_non_empty("GEMINI_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = env_non_empty("GEMINI_BASE_URL") {
            self.llm.base_url = Some(url);
        }

        if let Some(key) = env_non_empty("SPEECH_API_KEY") {
            self.speech.api_key = Some(key);
        }
        if let Some(provider) = env_non_empty("SPEECH_PROVIDER") {
            self.speech.provider = provider.to_lowercase();
        }
        if let Some(model) = env_non_empty("SPEECH_MODEL") {
            self.speech.model = Some(model);
        }
        if let Some(url) = env_non_empty("SPEECH_BASE_URL") {
            self.speech.base_url = Some(url);
        }

        if let Some(host) = env_non_empty("HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parsed("PORT")? {
            self.server.port = port;
        }
        if let Some(origins) = env_non_empty("ALLOWED_ORIGINS") {
            self.server.allowed_origins = Some(
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }

        if let Some(prompt) = env_non_empty("SYSTEM_PROMPT") {
            self.chat.system_prompt = prompt;
        }
        if let Some(n) = env_parsed("MAX_MESSAGES")? {
            self.chat.max_messages = n;
        }
        if let Some(n) = env_parsed("CONTEXT_WINDOW")? {
            self.chat.context_window = n;
        }

        if let Some(n) = env_parsed("WS_MAX_CONSECUTIVE_ERRORS")? {
            self.ws.max_consecutive_errors = n;
        }

        Ok(())
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> crate::Result<Option<T>> {
    match env_non_empty(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", name, raw))),
        None => Ok(None),
    }
}
