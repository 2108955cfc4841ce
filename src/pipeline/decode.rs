//! Streaming decoders (Bytes -> JSON frames)
//!
//! Decoders only understand *framing* (SSE, NDJSON). What a frame means is up
//! to the adapter that reads them.

use crate::{BoxStream, Error, Result};
use bytes::Bytes;
use futures::{stream, StreamExt};
use serde_json::Value;

/// One decoded unit of a vendor byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Data(Value),
    /// The vendor's explicit end-of-stream signal (SSE `[DONE]`).
    Done,
}

pub trait Decoder: Send + Sync {
    /// Lazily decodes `input`; bytes are pulled only as frames are demanded.
    fn decode(&self, input: BoxStream<'static, Bytes>) -> BoxStream<'static, Frame>;
}

/// Server-sent events decoder:
/// - frames end at a blank line (`\n\n` or `\r\n\r\n`)
/// - multiple `data:` lines in one frame are joined with `\n`
/// - comment lines (`:`) and non-data fields are ignored
/// - `done_signal` (default `[DONE]`) becomes [`Frame::Done`]
///
/// Frames after the done signal are still decoded; deciding whether they are
/// legal is left to the caller.
#[derive(Debug, Clone)]
pub struct SseDecoder {
    done_signal: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::with_done_signal("[DONE]")
    }

    pub fn with_done_signal(done_signal: impl Into<String>) -> Self {
        Self {
            done_signal: done_signal.into(),
        }
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SseDecoder {
    fn decode(&self, input: BoxStream<'static, Bytes>) -> BoxStream<'static, Frame> {
        let state = SseState {
            input,
            buf: Vec::new(),
            data: Vec::new(),
            eof: false,
            done_signal: self.done_signal.clone(),
        };

        let stream = stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            loop {
                if let Some(frame) = state.take_frame() {
                    return Some((frame, Some(state)));
                }
                if state.eof {
                    return state.finish().map(|frame| (frame, Some(state)));
                }
                match state.input.next().await {
                    Some(Ok(bytes)) => state.buf.extend_from_slice(&bytes),
                    // Transport failures end the frame stream.
                    Some(Err(e)) => return Some((Err(e), None)),
                    None => state.eof = true,
                }
            }
        });

        Box::pin(stream)
    }
}

struct SseState {
    input: BoxStream<'static, Bytes>,
    // Raw bytes so multi-byte characters split across chunks survive.
    buf: Vec<u8>,
    data: Vec<String>,
    eof: bool,
    done_signal: String,
}

impl SseState {
    fn take_frame(&mut self) -> Option<Result<Frame>> {
        while let Some(line) = next_line(&mut self.buf) {
            if let Some(frame) = self.push_line(&line) {
                return Some(frame);
            }
        }
        None
    }

    fn finish(&mut self) -> Option<Result<Frame>> {
        if !self.buf.is_empty() {
            let mut line = std::mem::take(&mut self.buf);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(frame) = self.push_line(&line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn push_line(&mut self, line: &[u8]) -> Option<Result<Frame>> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line[0] == b':' {
            return None;
        }
        let text = match std::str::from_utf8(line) {
            Ok(t) => t,
            Err(e) => {
                return Some(Err(Error::protocol_violation(format!(
                    "invalid UTF-8 in SSE line: {}",
                    e
                ))))
            }
        };
        let (field, value) = match text.find(':') {
            Some(i) => {
                let value = &text[i + 1..];
                (&text[..i], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (text, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<Result<Frame>> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        let payload = payload.trim();
        if payload.is_empty() {
            return None;
        }
        if payload == self.done_signal {
            return Some(Ok(Frame::Done));
        }
        Some(serde_json::from_str(payload).map(Frame::Data).map_err(Error::from))
    }
}

/// NDJSON / JSONL decoder (one JSON object per line). Never yields [`Frame::Done`].
#[derive(Debug, Clone, Default)]
pub struct NdjsonDecoder;

impl Decoder for NdjsonDecoder {
    fn decode(&self, input: BoxStream<'static, Bytes>) -> BoxStream<'static, Frame> {
        let stream = stream::unfold(
            Some((input, Vec::<u8>::new(), false)),
            |state| async move {
                let (mut input, mut buf, mut eof) = state?;
                loop {
                    let line = match next_line(&mut buf) {
                        Some(line) => Some(line),
                        None if eof && !buf.is_empty() => Some(std::mem::take(&mut buf)),
                        None if eof => return None,
                        None => None,
                    };
                    if let Some(line) = line {
                        let parsed = match std::str::from_utf8(&line) {
                            Ok(text) if text.trim().is_empty() => continue,
                            Ok(text) => serde_json::from_str::<Value>(text.trim())
                                .map(Frame::Data)
                                .map_err(Error::from),
                            Err(e) => Err(Error::protocol_violation(format!(
                                "invalid UTF-8 in NDJSON line: {}",
                                e
                            ))),
                        };
                        return Some((parsed, Some((input, buf, eof))));
                    }

                    match input.next().await {
                        Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                        Some(Err(e)) => return Some((Err(e), None)),
                        None => eof = true,
                    }
                }
            },
        );

        Box::pin(stream)
    }
}

/// Pops one `\n`-terminated line (without `\n` or trailing `\r`) off `buf`.
fn next_line(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let pos = buf.iter().position(|b| *b == b'\n')?;
    let mut line: Vec<u8> = buf.drain(..=pos).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(line)
}
