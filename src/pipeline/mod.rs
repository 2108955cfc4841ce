//! 流式处理模块：将各厂商的增量响应规范化为统一的流事件序列。
//!
//! # Streaming Pipeline
//!
//! Turns a backend-native incremental response into the four-event
//! [`StreamEvent`](crate::types::StreamEvent) vocabulary, whatever the source
//! backend.
//!
//! ## Stages
//!
//! ```text
//! HTTP body ─▶ Decoder ─▶ adapter frame mapping ─▶ normalize ─▶ EventStream
//!   Bytes      SSE/NDJSON    ProviderChunk           state machine   cancel hook
//! ```
//!
//! Decoding and frame mapping live with the adapters (they know the vendor
//! format); [`StreamPipeline::run`] owns everything after [`ProviderChunk`].
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`StreamPipeline`] | Normalizes a [`ChunkStream`] with an optional idle timeout |
//! | [`EventStream`] | Consumer-facing stream, exactly one terminal event |
//! | [`CancelHandle`] | Cancels an [`EventStream`] from another task |
//! | [`decode`] | SSE and NDJSON framing decoders |
//!
//! ## Guarantees
//!
//! - Incremental: nothing is buffered beyond the chunk being decoded; the
//!   vendor body is read only as the consumer polls.
//! - Exactly one of `Completed` / `Error`, always last.
//! - A chunk after the adapter's finish marker surfaces as
//!   `Error { kind: ProtocolViolation }`.
//! - Cancel or drop closes the vendor connection.

pub mod controlled;
pub mod decode;
pub mod normalize;

pub use controlled::{CancelHandle, EventStream};
pub use decode::{Decoder, Frame, NdjsonDecoder, SseDecoder};

use crate::provider::ChunkStream;
use crate::types::ProviderChunk;
use std::time::Duration;

/// Runs adapter chunk streams through the normalizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamPipeline {
    idle_timeout: Option<Duration>,
}

impl StreamPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum gap between two chunks before the stream fails with a timeout.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    pub fn run(&self, provider: &str, chunks: ChunkStream) -> EventStream {
        EventStream::new(
            provider,
            normalize::normalize(provider, chunks, self.idle_timeout),
        )
    }
}

/// Convenience for adapters and tests: a chunk stream from a fixed script.
pub fn scripted(chunks: Vec<crate::Result<ProviderChunk>>) -> ChunkStream {
    Box::pin(futures::stream::iter(chunks))
}
