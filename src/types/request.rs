//! Capability requests and the token budget attached to text requests.

use crate::types::message::Message;
use crate::{Error, ErrorContext, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Provider-specific options, forwarded to the adapter untouched.
pub type Options = serde_json::Map<String, Value>;

/// Maximum number of prompt tokens for a request, under a model's tokenizer.
///
/// There is no `Default`: an unlimited budget must be asked for with
/// [`TokenBudget::unlimited`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub model_name: String,
    pub max_tokens: Option<usize>,
}

impl TokenBudget {
    pub fn limited(model_name: impl Into<String>, max_tokens: usize) -> Self {
        Self {
            model_name: model_name.into(),
            max_tokens: Some(max_tokens),
        }
    }

    /// Explicit opt-out of budget enforcement.
    pub fn unlimited(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            max_tokens: None,
        }
    }

    pub fn is_enforced(&self) -> bool {
        self.max_tokens.is_some()
    }
}

/// Chat / streaming chat request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
    pub model_name: String,
    pub budget: TokenBudget,
    pub options: Options,
}

impl GenerationRequest {
    pub fn new(model_name: impl Into<String>, messages: Vec<Message>, budget: TokenBudget) -> Self {
        Self {
            messages,
            model_name: model_name.into(),
            budget,
            options: Options::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options.extend(options);
        self
    }
}

/// Where transcription audio comes from.
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// A file on disk; its file name is sent to the vendor.
    Path(PathBuf),
    /// An in-memory buffer. A filename is required because vendors infer the
    /// container format from it.
    Buffer {
        data: Bytes,
        filename: Option<String>,
    },
}

impl AudioSource {
    pub fn path(path: impl AsRef<Path>) -> Self {
        AudioSource::Path(path.as_ref().to_path_buf())
    }

    pub fn buffer(data: impl Into<Bytes>, filename: Option<String>) -> Self {
        AudioSource::Buffer {
            data: data.into(),
            filename,
        }
    }

    /// Validates the source and reads it into memory.
    pub async fn load(&self) -> Result<AudioInput> {
        match self {
            AudioSource::Path(path) => {
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| {
                        Error::validation_with_context(
                            "audio path has no file name",
                            ErrorContext::new()
                                .with_field_path("audio.path")
                                .with_details(path.display().to_string()),
                        )
                    })?
                    .to_string();
                let data = tokio::fs::read(path).await?;
                Ok(AudioInput {
                    file_name,
                    data: Bytes::from(data),
                })
            }
            AudioSource::Buffer { data, filename } => {
                let file_name = filename
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| {
                        Error::validation_with_context(
                            "in-memory audio requires a filename",
                            ErrorContext::new().with_field_path("audio.filename"),
                        )
                    })?
                    .to_string();
                Ok(AudioInput {
                    file_name,
                    data: data.clone(),
                })
            }
        }
    }
}

/// Audio ready to be uploaded.
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub file_name: String,
    pub data: Bytes,
}

impl AudioInput {
    pub fn mime_type(&self) -> &'static str {
        let ext = Path::new(&self.file_name)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "mp3" | "mpga" | "mpeg" => "audio/mpeg",
            "wav" => "audio/wav",
            "ogg" | "oga" => "audio/ogg",
            "opus" => "audio/opus",
            "m4a" | "mp4" => "audio/mp4",
            "flac" => "audio/flac",
            "webm" => "audio/webm",
            _ => "application/octet-stream",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub model_name: String,
    pub audio: AudioSource,
    pub options: Options,
}

impl TranscriptionRequest {
    pub fn new(model_name: impl Into<String>, audio: AudioSource) -> Self {
        Self {
            model_name: model_name.into(),
            audio,
            options: Options::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Text-to-speech request.
///
/// By default the audio is written to the output store under a freshly
/// generated unique name. `as_bytes` returns it in memory instead;
/// `overwrite_name` writes to a fixed name, replacing any existing file.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub model_name: String,
    pub text: String,
    pub as_bytes: bool,
    pub overwrite_name: Option<String>,
    pub options: Options,
}

impl SpeechRequest {
    pub fn new(model_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            text: text.into(),
            as_bytes: false,
            overwrite_name: None,
            options: Options::new(),
        }
    }

    pub fn as_bytes(mut self) -> Self {
        self.as_bytes = true;
        self
    }

    pub fn overwrite_file(mut self, name: impl Into<String>) -> Self {
        self.overwrite_name = Some(name.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub model_name: String,
    pub prompt: String,
    pub count: usize,
    pub as_bytes: bool,
    pub options: Options,
}

impl ImageRequest {
    pub fn new(model_name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            prompt: prompt.into(),
            count: 1,
            as_bytes: false,
            options: Options::new(),
        }
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn as_bytes(mut self) -> Self {
        self.as_bytes = true;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}
