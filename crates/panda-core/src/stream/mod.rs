//! Response streaming
//!
//! Turns generated text into ordered frames for a single consumer, with
//! backpressure and cancellation when the consumer disconnects.

mod coordinator;
mod frame;
mod sink;

pub use coordinator::{ChunkStream, Producer, RunStatus, StreamOutcome, run};
pub use frame::StreamFrame;
pub use sink::{ChannelSink, CollectSink, FrameSink, PushStatus};
