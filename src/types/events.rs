//! Normalized streaming events and the adapter-level chunks they are built from.

use crate::error_code::ErrorKind;
use crate::Error;
use serde::{Deserialize, Serialize};

/// One normalized unit of incremental output.
///
/// A well-formed sequence is `{Delta | Refusal}* (Completed | Error)`: exactly
/// one terminal event, always last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Delta { text: String },
    Refusal { text: String },
    Completed,
    Error { kind: ErrorKind, message: String },
}

impl StreamEvent {
    pub fn delta(text: impl Into<String>) -> Self {
        StreamEvent::Delta { text: text.into() }
    }

    pub fn refusal(text: impl Into<String>) -> Self {
        StreamEvent::Refusal { text: text.into() }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        StreamEvent::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Completed | StreamEvent::Error { .. })
    }

    /// Line-delimited wire form for callers consuming the stream as text.
    ///
    /// `Error` has no line: it ends the line stream without the completed marker.
    pub fn to_wire_line(&self) -> Option<String> {
        let value = match self {
            StreamEvent::Delta { text } => serde_json::json!({ "delta": text }),
            StreamEvent::Refusal { text } => serde_json::json!({ "refusal": text }),
            StreamEvent::Completed => serde_json::json!({ "event": "completed" }),
            StreamEvent::Error { .. } => return None,
        };
        Some(value.to_string())
    }
}

impl From<&Error> for StreamEvent {
    fn from(err: &Error) -> Self {
        StreamEvent::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// What an adapter's native stream yields before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderChunk {
    /// Incremental text, in vendor emission order.
    Text(String),
    /// Incremental refusal text.
    Refusal(String),
    /// The vendor signalled the end of the response. Nothing may follow.
    Finished,
}
