//! Shared test doubles for integration tests

#![allow(dead_code)]

use ai_gateway::pipeline::scripted;
use ai_gateway::provider::{
    ChunkStream, ImageGeneration, ProviderAdapter, SpeechSynthesis, StructuredGeneration,
    TextGeneration, TextStreaming, Transcription,
};
use ai_gateway::structured::JsonSchemaFormat;
use ai_gateway::types::{
    AudioFormat, AudioInput, AudioPayload, ImagePayload, Message, Options, ProviderChunk,
};
use ai_gateway::{Capability, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sets a flag when dropped; moved into a stream to observe its release.
pub struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Deterministic backend: chat returns the concatenated pieces, the stream
/// yields them one by one and then the finish marker, structured chat wraps
/// them as `{"schema": name, "text": pieces}`.
#[derive(Debug)]
pub struct ScriptedAdapter {
    name: String,
    pieces: Vec<String>,
    capabilities: Vec<Capability>,
    delay: Option<Duration>,
    hang_after_pieces: bool,
    pub calls: AtomicUsize,
    pub stream_released: Arc<AtomicBool>,
}

impl ScriptedAdapter {
    pub fn new(name: &str, pieces: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            pieces: pieces.iter().map(|p| p.to_string()).collect(),
            capabilities: Capability::ALL.to_vec(),
            delay: None,
            hang_after_pieces: false,
            calls: AtomicUsize::new(0),
            stream_released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn only(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = capabilities.to_vec();
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The stream never ends after the last piece.
    pub fn hanging(mut self) -> Self {
        self.hang_after_pieces = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stream_released(&self) -> bool {
        self.stream_released.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl TextGeneration for ScriptedAdapter {
    async fn chat(&self, _model: &str, _messages: &[Message], _: &Options) -> Result<String> {
        self.enter().await;
        Ok(self.pieces.concat())
    }
}

#[async_trait]
impl TextStreaming for ScriptedAdapter {
    async fn chat_stream(
        &self,
        _model: &str,
        _messages: &[Message],
        _: &Options,
    ) -> Result<ChunkStream> {
        self.enter().await;
        let mut script: Vec<Result<ProviderChunk>> = self
            .pieces
            .iter()
            .map(|p| Ok(ProviderChunk::Text(p.clone())))
            .collect();
        let guard = DropFlag(self.stream_released.clone());
        let stream = if self.hang_after_pieces {
            scripted(script)
                .chain(futures::stream::pending())
                .boxed()
        } else {
            script.push(Ok(ProviderChunk::Finished));
            scripted(script)
        };
        Ok(Box::pin(stream.map(move |chunk| {
            let _ = &guard;
            chunk
        })))
    }
}

#[async_trait]
impl StructuredGeneration for ScriptedAdapter {
    async fn chat_structured(
        &self,
        _model: &str,
        _messages: &[Message],
        _: &Options,
        format: &JsonSchemaFormat,
    ) -> Result<Value> {
        self.enter().await;
        Ok(json!({"schema": format.name, "text": self.pieces.concat()}))
    }
}

#[async_trait]
impl Transcription for ScriptedAdapter {
    async fn transcribe(&self, _model: &str, audio: AudioInput, _: &Options) -> Result<String> {
        self.enter().await;
        Ok(format!("{}:{}", audio.file_name, audio.data.len()))
    }
}

#[async_trait]
impl SpeechSynthesis for ScriptedAdapter {
    async fn synthesize_speech(&self, _model: &str, text: &str, _: &Options) -> Result<AudioPayload> {
        self.enter().await;
        Ok(AudioPayload {
            data: Bytes::from(format!("ID3{}", text)),
            format: AudioFormat::Mp3,
        })
    }
}

#[async_trait]
impl ImageGeneration for ScriptedAdapter {
    async fn generate_image(
        &self,
        _model: &str,
        _prompt: &str,
        count: usize,
        _: &Options,
    ) -> Result<Vec<ImagePayload>> {
        self.enter().await;
        Ok((0..count)
            .map(|i| {
                let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
                png.push(i as u8);
                ImagePayload::new(Bytes::from(png))
            })
            .collect())
    }
}

impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn text(&self) -> Option<&dyn TextGeneration> {
        self.capabilities
            .contains(&Capability::Chat)
            .then_some(self as &dyn TextGeneration)
    }

    fn streaming(&self) -> Option<&dyn TextStreaming> {
        self.capabilities
            .contains(&Capability::ChatStream)
            .then_some(self as &dyn TextStreaming)
    }

    fn structured(&self) -> Option<&dyn StructuredGeneration> {
        self.capabilities
            .contains(&Capability::StructuredChat)
            .then_some(self as &dyn StructuredGeneration)
    }

    fn transcription(&self) -> Option<&dyn Transcription> {
        self.capabilities
            .contains(&Capability::Transcribe)
            .then_some(self as &dyn Transcription)
    }

    fn speech(&self) -> Option<&dyn SpeechSynthesis> {
        self.capabilities
            .contains(&Capability::SynthesizeSpeech)
            .then_some(self as &dyn SpeechSynthesis)
    }

    fn images(&self) -> Option<&dyn ImageGeneration> {
        self.capabilities
            .contains(&Capability::GenerateImage)
            .then_some(self as &dyn ImageGeneration)
    }
}

/// Fresh directory under the system temp dir.
pub fn temp_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("ai-gateway-{}-{}", label, uuid::Uuid::new_v4()))
}
