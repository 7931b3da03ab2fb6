//! Frame sinks
//!
//! A sink is the outbound side of a transport. It reports whether the
//! consumer is still listening so the coordinator can stop early.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::stream::StreamFrame;

/// Result of pushing a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    Delivered,
    /// The consumer disconnected; not an error
    ConsumerGone,
}

/// Outbound channel of a single consumer
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Deliver a frame, waiting while the consumer is behind
    async fn push(&mut self, frame: StreamFrame) -> PushStatus;

    /// Whether the consumer is still connected
    fn is_open(&self) -> bool;

    /// Resolves once the consumer has gone away
    async fn closed(&self) {
        std::future::pending::<()>().await
    }
}

/// Sink backed by a bounded mpsc channel
///
/// A full channel suspends `push`, so a slow reader throttles the producer.
pub struct ChannelSink {
    tx: mpsc::Sender<StreamFrame>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<StreamFrame>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver that feeds the transport
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn push(&mut self, frame: StreamFrame) -> PushStatus {
        match self.tx.send(frame).await {
            Ok(()) => PushStatus::Delivered,
            Err(_) => PushStatus::ConsumerGone,
        }
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Sink that keeps every frame in memory; used for non-streaming replies
#[derive(Debug, Default)]
pub struct CollectSink {
    frames: Vec<StreamFrame>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[StreamFrame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<StreamFrame> {
        self.frames
    }
}

#[async_trait]
impl FrameSink for CollectSink {
    async fn push(&mut self, frame: StreamFrame) -> PushStatus {
        self.frames.push(frame);
        PushStatus::Delivered
    }

    fn is_open(&self) -> bool {
        true
    }
}
