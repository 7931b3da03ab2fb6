//! Gemini API HTTP client

use std::collections::VecDeque;
use std::fmt::Display;

use async_trait::async_trait;
use futures::stream::Stream;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{Error, GenerationError, Result};
use crate::stream::ChunkStream;

use super::sse::SseDecoder;
use super::types::*;
use super::Generator;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini generative model client
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// Create a new client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::Http)?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create with custom base URL (for testing or proxies)
    pub fn with_base_url(config: &LlmConfig, base_url: impl Into<String>) -> Result<Self> {
        let mut client = Self::new(config)?;
        client.base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(client)
    }

    /// Get the model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether an API key is present
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    /// POST the context and return the successful response
    async fn send(
        &self,
        url: &str,
        query: &[(&str, &str)],
        ctx: &PromptContext,
    ) -> std::result::Result<reqwest::Response, GenerationError> {
        if !self.is_configured() {
            return Err(GenerationError::NotConfigured);
        }

        debug!("Sending request to Gemini API: {}", url);

        let response = self
            .client
            .post(url)
            .query(query)
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateContentRequest::from_context(ctx))
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Gemini API error: {} - {}", status, body);
            return Err(GenerationError::Api(format!("{}: {}", status, body)));
        }

        Ok(response)
    }

    async fn open_stream(&self, ctx: PromptContext) -> std::result::Result<ChunkStream, GenerationError> {
        let url = self.endpoint("streamGenerateContent");
        let response = self.send(&url, &[("alt", "sse")], &ctx).await?;
        Ok(sse_chunks(response.bytes_stream().boxed()))
    }
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, ctx: &PromptContext) -> std::result::Result<String, GenerationError> {
        let url = self.endpoint("generateContent");
        let response = self.send(&url, &[], ctx).await?;

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Transport(format!("Failed to parse response: {}", e)))?;

        if let Some(err) = parsed.error {
            return Err(GenerationError::Api(format!("{}: {}", err.code, err.message)));
        }

        let text = parsed.text();
        info!("Gemini API response: {} chars", text.len());
        Ok(text)
    }

    fn generate_stream(&self, ctx: PromptContext) -> ChunkStream {
        let this = self.clone();
        futures::stream::once(async move { this.open_stream(ctx).await })
            .try_flatten()
            .boxed()
    }
}

struct SseState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<std::result::Result<String, GenerationError>>,
    done: bool,
}

/// Decode a `streamGenerateContent?alt=sse` body into text chunks
fn sse_chunks<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        bytes,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.done = true;
                    state.pending.clear();
                }
                return Some((item, state));
            }
            if state.done {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(buf)) => {
                    for data in state.decoder.feed(buf.as_ref()) {
                        state.pending.extend(parse_event(&data));
                    }
                }
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(GenerationError::Transport(e.to_string())));
                }
                None => {
                    state.done = true;
                    if let Some(data) = state.decoder.finish() {
                        state.pending.extend(parse_event(&data));
                    }
                }
            }
        }
    })
    .boxed()
}

/// Parse one event payload; empty text yields nothing
fn parse_event(data: &str) -> Option<std::result::Result<String, GenerationError>> {
    if data.trim() == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<GenerateContentResponse>(data) {
        Ok(parsed) => {
            if let Some(err) = parsed.error {
                return Some(Err(GenerationError::Api(format!("{}: {}", err.code, err.message))));
            }
            let text = parsed.text();
            (!text.is_empty()).then_some(Ok(text))
        }
        Err(e) => Some(Err(GenerationError::Transport(format!(
            "Failed to parse stream event: {}",
            e
        )))),
    }
}
