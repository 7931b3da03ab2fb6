//! Generative model access
//!
//! The `Generator` trait is the seam the chat orchestrator talks to;
//! `GeminiClient` is the production implementation.

mod client;
mod sse;
mod types;

use async_trait::async_trait;

use crate::error::GenerationError;
use crate::stream::ChunkStream;

pub use client::GeminiClient;
pub use types::*;

/// Text generation collaborator
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce the full response in one call
    async fn generate(&self, ctx: &PromptContext) -> Result<String, GenerationError>;

    /// Produce the response incrementally
    ///
    /// Failures, including ones that happen before the first chunk, are
    /// yielded as stream items.
    fn generate_stream(&self, ctx: PromptContext) -> ChunkStream;
}
