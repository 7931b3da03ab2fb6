//! Stream coordinator
//!
//! Drives a producer of text chunks into a sink, one chunk at a time. The
//! producer is only polled again once the previous frame has been accepted,
//! so it can never run more than one chunk ahead of the consumer.

use std::future::Future;

use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, warn};

use crate::error::GenerationError;
use crate::session::ConversationId;
use crate::stream::{FrameSink, PushStatus, StreamFrame};

/// Lazy, finite, non-restartable sequence of generated text chunks
pub type ChunkStream = BoxStream<'static, Result<String, GenerationError>>;

/// Source of generated text, either single-shot or incremental
pub struct Producer {
    chunks: ChunkStream,
}

impl Producer {
    /// Incremental producer
    pub fn stream(chunks: ChunkStream) -> Self {
        Self { chunks }
    }

    /// Producer yielding exactly one chunk: the full result of `fut`
    pub fn single<F>(fut: F) -> Self
    where
        F: Future<Output = Result<String, GenerationError>> + Send + 'static,
    {
        Self {
            chunks: futures::stream::once(fut).boxed(),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    ConsumerGone,
    Failed(GenerationError),
}

/// Accumulated text plus how the run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub text: String,
    pub status: RunStatus,
}

impl StreamOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

enum Step {
    Next(Option<Result<String, GenerationError>>),
    Gone,
}

/// Run `producer` to completion, pushing frames into `sink`
///
/// Returns the accumulated text. A disconnected consumer stops the run
/// without further frames; a producer failure ends it with one error frame.
pub async fn run<S>(producer: Producer, conversation_id: &ConversationId, sink: &mut S) -> StreamOutcome
where
    S: FrameSink + ?Sized,
{
    let mut chunks = producer.chunks;
    let mut text = String::new();

    loop {
        if !sink.is_open() {
            return consumer_gone(conversation_id, text);
        }

        let step = tokio::select! {
            biased;
            _ = sink.closed() => Step::Gone,
            next = chunks.next() => Step::Next(next),
        };

        match step {
            Step::Gone => return consumer_gone(conversation_id, text),
            Step::Next(Some(Ok(chunk))) => {
                text.push_str(&chunk);
                let frame = StreamFrame::chunk(conversation_id.clone(), chunk);
                if sink.push(frame).await == PushStatus::ConsumerGone {
                    return consumer_gone(conversation_id, text);
                }
            }
            Step::Next(Some(Err(e))) => {
                warn!("Generation failed for conversation {}: {}", conversation_id, e);
                let frame = StreamFrame::error(conversation_id.clone(), format!("Error: {}", e));
                // The consumer may already be gone; the outcome is the same.
                let _ = sink.push(frame).await;
                return StreamOutcome {
                    text,
                    status: RunStatus::Failed(e),
                };
            }
            Step::Next(None) => {
                let _ = sink.push(StreamFrame::done(conversation_id.clone())).await;
                debug!(
                    "Stream complete for conversation {}: {} chars",
                    conversation_id,
                    text.len()
                );
                return StreamOutcome {
                    text,
                    status: RunStatus::Completed,
                };
            }
        }
    }
}

fn consumer_gone(conversation_id: &ConversationId, text: String) -> StreamOutcome {
    debug!(
        "Consumer left conversation {} after {} chars",
        conversation_id,
        text.len()
    );
    StreamOutcome {
        text,
        status: RunStatus::ConsumerGone,
    }
}
