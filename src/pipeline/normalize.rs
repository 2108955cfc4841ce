//! Chunk → event normalization: the streaming state machine.
//!
//! ```text
//! Open ──Text/Refusal──▶ Open
//!   │ Finished            │ end of stream / error / idle timeout
//!   ▼                     ▼
//! Finishing ──────────▶ Closed  (exactly one Completed | Error emitted)
//! ```
//!
//! In `Finishing` the adapter has declared the response complete; anything
//! but end-of-stream is a protocol violation. A body left open after the
//! marker completes after [`FINISH_GRACE`] (or the idle timeout, if shorter).

use crate::error_code::ErrorKind;
use crate::provider::ChunkStream;
use crate::types::{ProviderChunk, StreamEvent};
use futures::{stream, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How long a finished stream may stay open before it is completed anyway.
pub const FINISH_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Finishing,
}

struct State {
    provider: Arc<str>,
    // `None` once closed; dropping it releases the vendor connection.
    chunks: Option<ChunkStream>,
    phase: Phase,
    idle_timeout: Option<Duration>,
    emitted: usize,
}

impl State {
    fn close(&mut self, event: StreamEvent) -> Option<StreamEvent> {
        self.chunks = None;
        Some(event)
    }

    fn violation(&mut self, what: &str) -> Option<StreamEvent> {
        warn!(provider = %self.provider, after_events = self.emitted, "{}", what);
        self.close(StreamEvent::error(ErrorKind::ProtocolViolation, what))
    }

    async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            let chunks = self.chunks.as_mut()?;
            let wait = match self.phase {
                Phase::Open => self.idle_timeout,
                Phase::Finishing => Some(
                    self.idle_timeout
                        .map_or(FINISH_GRACE, |limit| limit.min(FINISH_GRACE)),
                ),
            };
            let waited = match wait {
                Some(limit) => tokio::time::timeout(limit, chunks.next())
                    .await
                    .map_err(|_| limit),
                None => Ok(chunks.next().await),
            };
            let next = match waited {
                Ok(next) => next,
                Err(_) if self.phase == Phase::Finishing => {
                    debug!(provider = %self.provider, "finished stream left open; completing");
                    return self.close(StreamEvent::Completed);
                }
                Err(limit) => {
                    error!(
                        provider = %self.provider,
                        idle_ms = limit.as_millis() as u64,
                        "stream idle timeout"
                    );
                    return self.close(StreamEvent::error(
                        ErrorKind::Timeout,
                        format!("no stream chunk within {} ms", limit.as_millis()),
                    ));
                }
            };

            match next {
                Some(Ok(ProviderChunk::Text(text))) | Some(Ok(ProviderChunk::Refusal(text)))
                    if text.is_empty() && self.phase == Phase::Open =>
                {
                    continue;
                }
                Some(Ok(ProviderChunk::Text(text))) => {
                    if self.phase == Phase::Finishing {
                        return self.violation("text chunk after the finish marker");
                    }
                    self.emitted += 1;
                    debug!(provider = %self.provider, len = text.len(), "delta");
                    return Some(StreamEvent::Delta { text });
                }
                Some(Ok(ProviderChunk::Refusal(text))) => {
                    if self.phase == Phase::Finishing {
                        return self.violation("refusal chunk after the finish marker");
                    }
                    self.emitted += 1;
                    debug!(provider = %self.provider, len = text.len(), "refusal");
                    return Some(StreamEvent::Refusal { text });
                }
                Some(Ok(ProviderChunk::Finished)) => {
                    if self.phase == Phase::Finishing {
                        return self.violation("duplicate finish marker");
                    }
                    self.phase = Phase::Finishing;
                }
                Some(Err(e)) => {
                    error!(provider = %self.provider, kind = %e.kind(), error = %e, "stream failed");
                    return self.close(StreamEvent::from(&e));
                }
                None => {
                    debug!(provider = %self.provider, events = self.emitted, "stream completed");
                    return self.close(StreamEvent::Completed);
                }
            }
        }
    }
}

/// Turns adapter chunks into a well-formed event sequence.
///
/// Pull-driven: the adapter stream is polled only when the consumer asks for
/// the next event. The adapter stream is dropped as soon as the terminal
/// event is produced.
pub fn normalize(
    provider: &str,
    chunks: ChunkStream,
    idle_timeout: Option<Duration>,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    let state = State {
        provider: Arc::from(provider),
        chunks: Some(chunks),
        phase: Phase::Open,
        idle_timeout,
        emitted: 0,
    };
    stream::unfold(state, |mut state| async move {
        let event = state.next_event().await?;
        Some((event, state))
    })
}
