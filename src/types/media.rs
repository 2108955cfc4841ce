//! Binary results: synthesized audio, generated images, and stored-file handles.

use bytes::Bytes;
use serde::Serialize;
use std::path::PathBuf;

/// Result of a binary-producing capability, in the shape the caller asked for.
#[derive(Debug, Clone)]
pub enum BinaryOutput {
    Bytes(Bytes),
    Stored(StoredFile),
}

impl BinaryOutput {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            BinaryOutput::Bytes(b) => Some(b),
            BinaryOutput::Stored(_) => None,
        }
    }

    pub fn as_stored(&self) -> Option<&StoredFile> {
        match self {
            BinaryOutput::Stored(f) => Some(f),
            BinaryOutput::Bytes(_) => None,
        }
    }
}

/// Handle to a result written by the output store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub media_type: String,
}

/// Audio returned by a speech adapter.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub data: Bytes,
    pub format: AudioFormat,
}

/// Supported audio formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Opus,
    Aac,
    Flac,
    Wav,
    Pcm,
}

impl AudioFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Opus => "audio/opus",
            Self::Aac => "audio/aac",
            Self::Flac => "audio/flac",
            Self::Wav => "audio/wav",
            Self::Pcm => "audio/pcm",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Pcm => "pcm",
        }
    }

    /// Case-insensitive; `None` for names no vendor produces.
    pub fn parse(s: &str) -> Option<Self> {
        let format = match s.to_lowercase().as_str() {
            "mp3" => Self::Mp3,
            "opus" => Self::Opus,
            "aac" => Self::Aac,
            "flac" => Self::Flac,
            "wav" => Self::Wav,
            "pcm" => Self::Pcm,
            _ => return None,
        };
        Some(format)
    }
}

/// One generated image.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub data: Bytes,
    pub format: ImageFormat,
}

impl ImagePayload {
    pub fn new(data: Bytes) -> Self {
        let format = ImageFormat::sniff(&data);
        Self { data, format }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    /// Detects the format from magic bytes; PNG when unrecognized.
    pub fn sniff(data: &[u8]) -> Self {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Self::Jpeg
        } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Self::Webp
        } else {
            Self::Png
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
        }
    }
}
