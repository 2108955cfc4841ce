//! OpenAI-compatible adapter: chat completions, SSE streaming, structured
//! outputs, audio transcription and synthesis, image generation.

use super::{
    body_stream, build_http_client, check_base_url, frame_error, join_url, merge_options,
    option_str, option_text, read_bytes, read_json, send,
};
use crate::error_code::ProviderErrorKind;
use crate::pipeline::{Decoder, Frame, SseDecoder};
use crate::provider::{
    ChunkStream, ImageGeneration, ProviderAdapter, SpeechSynthesis, StructuredGeneration,
    TextGeneration, TextStreaming, Transcription,
};
use crate::structured::{parse_structured, JsonSchemaFormat};
use crate::types::{
    AudioFormat, AudioInput, AudioPayload, ImagePayload, Message, Options, ProviderChunk,
};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_TRANSCRIPTION_LANGUAGE: &str = "ru";
const DEFAULT_VOICE: &str = "alloy";

/// Adapter for the OpenAI API and OpenAI-compatible servers.
pub struct OpenAiAdapter {
    name: String,
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiAdapter {
    pub fn builder() -> OpenAiAdapterBuilder {
        OpenAiAdapterBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.post(self.url(path)).bearer_auth(&self.api_key)
    }

    fn chat_body(model: &str, messages: &[Message], options: &Options, stream: bool) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role().as_str(), "content": m.content() }))
            .collect();
        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        merge_options(&mut body, options, &["model", "messages", "stream"]);
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }

    fn upstream(&self, message: impl Into<String>) -> Error {
        Error::provider(&self.name, ProviderErrorKind::Upstream, message)
    }

    /// Posts a non-streaming completion and returns `choices[0].message`.
    async fn complete(&self, body: &Value) -> Result<Value> {
        let response = send(&self.name, self.post("/v1/chat/completions").json(body)).await?;
        let mut json = read_json(&self.name, response).await?;
        json.pointer_mut("/choices/0/message")
            .map(Value::take)
            .ok_or_else(|| self.upstream("chat completion has no choices"))
    }
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TextGeneration for OpenAiAdapter {
    async fn chat(&self, model: &str, messages: &[Message], options: &Options) -> Result<String> {
        let started = Instant::now();
        let body = Self::chat_body(model, messages, options, false);
        let message = self.complete(&body).await?;
        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();
        if let Some(refusal) = message.get("refusal").and_then(|r| r.as_str()) {
            warn!(provider = %self.name, model = model, refusal = refusal, "model refused");
        }
        debug!(
            provider = %self.name,
            model = model,
            chars = content.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "chat completed"
        );
        Ok(content)
    }
}

#[async_trait]
impl StructuredGeneration for OpenAiAdapter {
    async fn chat_structured(
        &self,
        model: &str,
        messages: &[Message],
        options: &Options,
        format: &JsonSchemaFormat,
    ) -> Result<Value> {
        let started = Instant::now();
        let mut body = Self::chat_body(model, messages, options, false);
        body["response_format"] = format.to_response_format();
        let message = self.complete(&body).await?;

        if let Some(refusal) = message
            .get("refusal")
            .and_then(|r| r.as_str())
            .filter(|r| !r.is_empty())
        {
            warn!(provider = %self.name, model = model, schema = %format.name, refusal = refusal, "model refused");
            return Err(Error::provider(&self.name, ProviderErrorKind::Refused, refusal));
        }
        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| self.upstream("structured answer has no content"))?;
        let value = parse_structured(&self.name, content)?;
        debug!(
            provider = %self.name,
            model = model,
            schema = %format.name,
            duration_ms = started.elapsed().as_millis() as u64,
            "structured chat completed"
        );
        Ok(value)
    }
}

#[async_trait]
impl TextStreaming for OpenAiAdapter {
    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        options: &Options,
    ) -> Result<ChunkStream> {
        let body = Self::chat_body(model, messages, options, true);
        let response = send(
            &self.name,
            self.post("/v1/chat/completions")
                .header("Accept", "text/event-stream")
                .json(&body),
        )
        .await?;
        debug!(provider = %self.name, model = model, "stream opened");

        let provider = self.name.clone();
        let frames = SseDecoder::new().decode(body_stream(&self.name, response));
        let chunks = frames.filter_map(move |frame| {
            let chunk = match frame {
                Ok(frame) => map_stream_frame(&provider, frame),
                Err(e) => Some(Err(e)),
            };
            futures::future::ready(chunk)
        });
        Ok(Box::pin(chunks))
    }
}

/// `choices[0].delta.content` → text, `choices[0].delta.refusal` → refusal,
/// `[DONE]` → finish marker. Role-only, usage-only and empty chunks are skipped.
fn map_stream_frame(provider: &str, frame: Frame) -> Option<Result<ProviderChunk>> {
    if let Some(err) = frame_error(provider, &frame) {
        return Some(Err(err));
    }
    let value = match frame {
        Frame::Done => return Some(Ok(ProviderChunk::Finished)),
        Frame::Data(value) => value,
    };
    let delta = value.pointer("/choices/0/delta")?;
    if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
        if !text.is_empty() {
            return Some(Ok(ProviderChunk::Text(text.to_string())));
        }
    }
    if let Some(text) = delta.get("refusal").and_then(|c| c.as_str()) {
        if !text.is_empty() {
            return Some(Ok(ProviderChunk::Refusal(text.to_string())));
        }
    }
    None
}

#[async_trait]
impl Transcription for OpenAiAdapter {
    async fn transcribe(
        &self,
        model: &str,
        audio: AudioInput,
        options: &Options,
    ) -> Result<String> {
        let mime = audio.mime_type();
        let size = audio.data.len();
        let part = reqwest::multipart::Part::bytes(audio.data.to_vec())
            .file_name(audio.file_name.clone())
            .mime_str(mime)
            .map_err(|e| {
                Error::validation_with_context(
                    format!("invalid audio mime type: {}", e),
                    ErrorContext::new().with_field_path("audio.filename"),
                )
            })?;
        let language = option_str(options, "language").unwrap_or(DEFAULT_TRANSCRIPTION_LANGUAGE);
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", model.to_string())
            .text("language", language.to_string());
        for (key, value) in options {
            if !matches!(key.as_str(), "file" | "model" | "language") {
                form = form.text(key.clone(), option_text(value));
            }
        }

        debug!(
            provider = %self.name,
            model = model,
            file = %audio.file_name,
            bytes = size,
            "sending audio for transcription"
        );
        let response = send(
            &self.name,
            self.post("/v1/audio/transcriptions").multipart(form),
        )
        .await?;
        let raw = read_bytes(&self.name, response).await?;

        // `response_format` text/srt/vtt answers are plain text.
        let text = match serde_json::from_slice::<Value>(&raw) {
            Ok(json) => json
                .get("text")
                .and_then(|t| t.as_str())
                .ok_or_else(|| self.upstream("transcription response has no text"))?
                .to_string(),
            Err(_) => String::from_utf8_lossy(&raw).trim().to_string(),
        };
        debug!(provider = %self.name, chars = text.len(), "transcription completed");
        Ok(text)
    }
}

#[async_trait]
impl SpeechSynthesis for OpenAiAdapter {
    async fn synthesize_speech(
        &self,
        model: &str,
        text: &str,
        options: &Options,
    ) -> Result<AudioPayload> {
        let format = match option_str(options, "response_format")
            .or_else(|| option_str(options, "format"))
        {
            Some(name) => AudioFormat::parse(name).ok_or_else(|| {
                Error::validation_with_context(
                    format!("unsupported speech format '{}'", name),
                    ErrorContext::new()
                        .with_field_path("speech.response_format")
                        .with_details("expected one of mp3, opus, aac, flac, wav, pcm")
                        .with_source(self.name.clone()),
                )
            })?,
            None => AudioFormat::Mp3,
        };
        let mut body = json!({
            "model": model,
            "input": text,
            "voice": option_str(options, "voice").unwrap_or(DEFAULT_VOICE),
            "response_format": format.extension(),
        });
        merge_options(
            &mut body,
            options,
            &["model", "input", "voice", "response_format", "format"],
        );

        let response = send(&self.name, self.post("/v1/audio/speech").json(&body)).await?;
        let data = read_bytes(&self.name, response).await?;
        if data.is_empty() {
            return Err(self.upstream("speech response is empty"));
        }
        debug!(provider = %self.name, model = model, bytes = data.len(), "speech synthesized");
        Ok(AudioPayload { data, format })
    }
}

#[async_trait]
impl ImageGeneration for OpenAiAdapter {
    async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        count: usize,
        options: &Options,
    ) -> Result<Vec<ImagePayload>> {
        let mut body = json!({
            "model": model,
            "prompt": prompt,
            "n": count,
        });
        // gpt-image models always answer with b64_json and reject the parameter.
        if model.starts_with("dall-e") && !options.contains_key("response_format") {
            body["response_format"] = json!("b64_json");
        }
        merge_options(&mut body, options, &["model", "prompt", "n"]);

        let response = send(&self.name, self.post("/v1/images/generations").json(&body)).await?;
        let json = read_json(&self.name, response).await?;
        let data = json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| self.upstream("image response has no data"))?;
        if data.len() != count {
            return Err(self.upstream(format!(
                "requested {} images, provider returned {}",
                count,
                data.len()
            )));
        }

        let mut images = Vec::with_capacity(data.len());
        for (i, item) in data.iter().enumerate() {
            let bytes = if let Some(b64) = item.get("b64_json").and_then(|v| v.as_str()) {
                base64::engine::general_purpose::STANDARD
                    .decode(b64)
                    .map(Bytes::from)
                    .map_err(|e| self.upstream(format!("image {} is not valid base64: {}", i, e)))?
            } else if let Some(url) = item.get("url").and_then(|v| v.as_str()) {
                let response = send(&self.name, self.http.get(url)).await?;
                read_bytes(&self.name, response).await?
            } else {
                return Err(self.upstream(format!("image {} has neither b64_json nor url", i)));
            };
            debug!(provider = %self.name, index = i, bytes = bytes.len(), "image generated");
            images.push(ImagePayload::new(bytes));
        }
        Ok(images)
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn text(&self) -> Option<&dyn TextGeneration> {
        Some(self)
    }

    fn streaming(&self) -> Option<&dyn TextStreaming> {
        Some(self)
    }

    fn structured(&self) -> Option<&dyn StructuredGeneration> {
        Some(self)
    }

    fn transcription(&self) -> Option<&dyn Transcription> {
        Some(self)
    }

    fn speech(&self) -> Option<&dyn SpeechSynthesis> {
        Some(self)
    }

    fn images(&self) -> Option<&dyn ImageGeneration> {
        Some(self)
    }
}

pub struct OpenAiAdapterBuilder {
    name: String,
    api_key: Option<String>,
    base_url: Option<String>,
    connect_timeout: Duration,
}

impl OpenAiAdapterBuilder {
    pub fn new() -> Self {
        Self {
            name: "openai".to_string(),
            api_key: None,
            base_url: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Provider name used in routes and errors (default `openai`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<OpenAiAdapter> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::configuration_with_context(
                    "OpenAI API key required",
                    ErrorContext::new()
                        .with_field_path("providers.openai.api_key")
                        .with_details("set OPENAI_API_KEY or configure the key"),
                )
            })?;
        let base_url = match self.base_url {
            Some(url) => check_base_url("providers.openai.base_url", &url)?,
            None => DEFAULT_BASE_URL.to_string(),
        };
        let http = build_http_client(self.connect_timeout)?;
        info!(provider = %self.name, base_url = %base_url, "OpenAI adapter initialized");
        Ok(OpenAiAdapter {
            name: self.name,
            http,
            base_url,
            api_key,
        })
    }
}

impl Default for OpenAiAdapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
