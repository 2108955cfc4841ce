//! Consumer-facing event stream with an explicit cancellation hook.

use crate::error_code::ErrorKind;
use crate::types::StreamEvent;
use crate::{Error, Result};
use futures::channel::oneshot;
use futures::{Future, Stream, StreamExt};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tracing::info;

type Events = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Cancels the [`EventStream`] it was taken from. Cheap to clone; only the
/// first `cancel()` has an effect.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let sender = self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(tx) = sender {
            let _ = tx.send(());
        }
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle").finish_non_exhaustive()
    }
}

/// Normalized stream events for one streaming request.
///
/// Yields `{Delta | Refusal}*` then exactly one of `Completed` / `Error`, then
/// ends. Dropping the stream, or cancelling it through a [`CancelHandle`],
/// drops the adapter stream and with it the vendor connection. A cancelled
/// stream ends with `Error { kind: Cancelled }`.
pub struct EventStream {
    provider: Arc<str>,
    inner: Option<Events>,
    cancel_rx: Option<oneshot::Receiver<()>>,
    cancel_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl EventStream {
    pub fn new<S>(provider: &str, events: S) -> Self
    where
        S: Stream<Item = StreamEvent> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        Self {
            provider: Arc::from(provider),
            inner: Some(Box::pin(events)),
            cancel_rx: Some(rx),
            cancel_tx: Arc::new(Mutex::new(Some(tx))),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    pub fn cancel(&self) {
        self.cancel_handle().cancel();
    }

    /// `false` once the terminal event has been yielded or the stream was cancelled.
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Drains the stream and concatenates every `Delta`, in arrival order.
    ///
    /// A terminal `Error` becomes the corresponding [`Error`]. Refusals carry
    /// no completion text and are skipped.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Delta { text: delta } => text.push_str(&delta),
                StreamEvent::Refusal { .. } => {}
                StreamEvent::Completed => return Ok(text),
                StreamEvent::Error { kind, message } => {
                    return Err(Error::from_stream_failure(&self.provider, kind, message))
                }
            }
        }
        // Streams not built by the normalizer may end without a terminal event.
        Ok(text)
    }

    /// Line-delimited wire form: one JSON object per event, `{"event":"completed"}`
    /// last. An `Error` ends the lines without the completed marker.
    pub fn wire_lines(self) -> impl Stream<Item = String> + Send + 'static {
        self.filter_map(|event| futures::future::ready(event.to_wire_line()))
    }
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.inner.is_none() {
            return Poll::Ready(None);
        }

        if let Some(rx) = this.cancel_rx.as_mut() {
            match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(())) => {
                    this.cancel_rx = None;
                    this.inner = None;
                    info!(provider = %this.provider, "stream cancelled by consumer");
                    return Poll::Ready(Some(StreamEvent::error(
                        ErrorKind::Cancelled,
                        "stream cancelled by consumer",
                    )));
                }
                Poll::Ready(Err(_)) => this.cancel_rx = None,
                Poll::Pending => {}
            }
        }

        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    this.inner = None;
                    this.cancel_rx = None;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.inner = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("provider", &self.provider)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct DropFlag(Arc<AtomicBool>);
    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn endless(flag: Arc<AtomicBool>) -> impl Stream<Item = StreamEvent> + Send {
        let guard = DropFlag(flag);
        stream::repeat_with(move || {
            let _keep = &guard;
            StreamEvent::delta("x")
        })
    }

    #[tokio::test]
    async fn test_cancel_drops_inner_and_terminates() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut events = EventStream::new("test", endless(dropped.clone()));
        assert_eq!(events.next().await, Some(StreamEvent::delta("x")));

        let handle = events.cancel_handle();
        handle.cancel();
        handle.cancel();

        match events.next().await {
            Some(StreamEvent::Error { kind, .. }) => assert_eq!(kind, ErrorKind::Cancelled),
            other => panic!("unexpected {other:?}"),
        }
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn test_drop_releases_inner() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut events = EventStream::new("test", endless(dropped.clone()));
        events.next().await;
        drop(events);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_nothing_after_terminal() {
        let events = EventStream::new(
            "test",
            stream::iter(vec![
                StreamEvent::delta("a"),
                StreamEvent::Completed,
                StreamEvent::delta("ghost"),
            ]),
        );
        let out: Vec<_> = events.collect().await;
        assert_eq!(out, vec![StreamEvent::delta("a"), StreamEvent::Completed]);
    }

    #[tokio::test]
    async fn test_collect_text_surfaces_error() {
        let events = EventStream::new(
            "test",
            stream::iter(vec![
                StreamEvent::delta("a"),
                StreamEvent::error(ErrorKind::Upstream, "boom"),
            ]),
        );
        let err = events.collect_text().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[tokio::test]
    async fn test_wire_lines_stop_at_error() {
        let events = EventStream::new(
            "test",
            stream::iter(vec![
                StreamEvent::delta("a"),
                StreamEvent::refusal("r"),
                StreamEvent::error(ErrorKind::Timeout, "late"),
            ]),
        );
        let lines: Vec<String> = events.wire_lines().collect().await;
        assert_eq!(lines, vec![r#"{"delta":"a"}"#, r#"{"refusal":"r"}"#]);
    }
}
