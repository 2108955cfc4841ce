//! 能力接口模块：后端按能力集声明其支持的操作，而非继承固定的模态层级。
//!
//! # Capability Interface
//!
//! A backend implements any subset of six capabilities. Each capability is
//! its own trait; a [`ProviderAdapter`] exposes the ones it implements through
//! accessor methods, and the gateway routes to them by configuration only.
//!
//! | Capability | Trait | Result |
//! |------------|-------|--------|
//! | [`Capability::Chat`] | [`TextGeneration`] | complete text |
//! | [`Capability::ChatStream`] | [`TextStreaming`] | [`ChunkStream`] of [`ProviderChunk`] |
//! | [`Capability::StructuredChat`] | [`StructuredGeneration`] | parsed JSON |
//! | [`Capability::Transcribe`] | [`Transcription`] | text |
//! | [`Capability::SynthesizeSpeech`] | [`SpeechSynthesis`] | [`AudioPayload`] |
//! | [`Capability::GenerateImage`] | [`ImageGeneration`] | ordered [`ImagePayload`]s |
//!
//! Adapters never check token budgets; that happens once, in the gateway,
//! before the adapter is called.

use crate::structured::JsonSchemaFormat;
use crate::types::{AudioInput, AudioPayload, ImagePayload, Message, Options, ProviderChunk};
use crate::{BoxStream, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Native incremental output of a streaming adapter.
///
/// Dropping the stream must release the underlying connection.
pub type ChunkStream = BoxStream<'static, ProviderChunk>;

/// One discrete operation a backend may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Chat,
    ChatStream,
    StructuredChat,
    Transcribe,
    SynthesizeSpeech,
    GenerateImage,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::Chat,
        Capability::ChatStream,
        Capability::StructuredChat,
        Capability::Transcribe,
        Capability::SynthesizeSpeech,
        Capability::GenerateImage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Chat => "chat",
            Capability::ChatStream => "chat_stream",
            Capability::StructuredChat => "structured_chat",
            Capability::Transcribe => "transcribe",
            Capability::SynthesizeSpeech => "synthesize_speech",
            Capability::GenerateImage => "generate_image",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait TextGeneration: Send + Sync {
    async fn chat(&self, model: &str, messages: &[Message], options: &Options) -> Result<String>;
}

#[async_trait]
pub trait TextStreaming: Send + Sync {
    /// Starts a streamed completion. Network I/O happens as the returned
    /// stream is polled; the stream is not rewindable.
    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        options: &Options,
    ) -> Result<ChunkStream>;
}

#[async_trait]
pub trait StructuredGeneration: Send + Sync {
    /// Completes under `format` and returns the parsed answer. A model
    /// refusal is a provider error of kind `Refused`.
    async fn chat_structured(
        &self,
        model: &str,
        messages: &[Message],
        options: &Options,
        format: &JsonSchemaFormat,
    ) -> Result<Value>;
}

#[async_trait]
pub trait Transcription: Send + Sync {
    async fn transcribe(&self, model: &str, audio: AudioInput, options: &Options)
        -> Result<String>;
}

#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    async fn synthesize_speech(
        &self,
        model: &str,
        text: &str,
        options: &Options,
    ) -> Result<AudioPayload>;
}

#[async_trait]
pub trait ImageGeneration: Send + Sync {
    /// Returns exactly `count` images, in generation order.
    async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        count: usize,
        options: &Options,
    ) -> Result<Vec<ImagePayload>>;
}

/// A backend and the capabilities it declares.
///
/// Every accessor defaults to `None`; an adapter overrides the ones it
/// implements. `capabilities()` is derived from the accessors so the
/// declaration cannot drift from the implementation.
pub trait ProviderAdapter: Send + Sync + fmt::Debug {
    /// Provider identifier used in routes, logs and errors.
    fn name(&self) -> &str;

    fn text(&self) -> Option<&dyn TextGeneration> {
        None
    }

    fn streaming(&self) -> Option<&dyn TextStreaming> {
        None
    }

    fn structured(&self) -> Option<&dyn StructuredGeneration> {
        None
    }

    fn transcription(&self) -> Option<&dyn Transcription> {
        None
    }

    fn speech(&self) -> Option<&dyn SpeechSynthesis> {
        None
    }

    fn images(&self) -> Option<&dyn ImageGeneration> {
        None
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Chat => self.text().is_some(),
            Capability::ChatStream => self.streaming().is_some(),
            Capability::StructuredChat => self.structured().is_some(),
            Capability::Transcribe => self.transcription().is_some(),
            Capability::SynthesizeSpeech => self.speech().is_some(),
            Capability::GenerateImage => self.images().is_some(),
        }
    }

    fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| self.supports(*c))
            .collect()
    }
}
