//! Yandex Cloud adapter: Foundation Models completion (sync and NDJSON
//! streaming), SpeechKit v1 recognition, YandexART image generation.
//!
//! The completion stream carries the *cumulative* alternative text on every
//! line; the adapter turns it into incremental deltas. A line whose text does
//! not extend what was already emitted is a protocol violation.

use super::{
    body_stream, build_http_client, check_base_url, frame_error, join_url, option_str,
    option_text, read_json, send, vendor_error,
};
use crate::error_code::ProviderErrorKind;
use crate::pipeline::{Decoder, Frame, NdjsonDecoder};
use crate::provider::{
    ChunkStream, ImageGeneration, ProviderAdapter, TextGeneration, TextStreaming, Transcription,
};
use crate::types::{AudioInput, ImagePayload, Message, MessageRole, Options, ProviderChunk};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures::{stream, StreamExt};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_LLM_URL: &str = "https://llm.api.cloud.yandex.net";
pub const DEFAULT_STT_URL: &str = "https://stt.api.cloud.yandex.net";
pub const DEFAULT_OPERATION_URL: &str = "https://operation.api.cloud.yandex.net";
const DEFAULT_STT_LANGUAGE: &str = "ru-RU";

const STATUS_FINAL: &str = "ALTERNATIVE_STATUS_FINAL";
const STATUS_CONTENT_FILTER: &str = "ALTERNATIVE_STATUS_CONTENT_FILTER";

pub struct YandexAdapter {
    name: String,
    http: reqwest::Client,
    api_key: String,
    folder_id: String,
    llm_url: String,
    stt_url: String,
    operation_url: String,
    poll_interval: Duration,
}

impl YandexAdapter {
    pub fn builder() -> YandexAdapterBuilder {
        YandexAdapterBuilder::new()
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .header("x-folder-id", &self.folder_id)
    }

    /// `gpt://<folder>/<model>/latest`, unless `model` is already a full URI.
    fn model_uri(&self, scheme: &str, model: &str) -> String {
        if model.contains("://") {
            model.to_string()
        } else {
            format!("{}://{}/{}/latest", scheme, self.folder_id, model)
        }
    }

    fn completion_body(
        &self,
        model: &str,
        messages: &[Message],
        options: &Options,
        stream: bool,
    ) -> Result<Value> {
        let mut messages_json = Vec::with_capacity(messages.len());
        for (i, m) in messages.iter().enumerate() {
            let role = match m.role() {
                MessageRole::System | MessageRole::Developer => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::Tool => {
                    return Err(Error::validation_with_context(
                        "tool messages are not supported by this provider",
                        ErrorContext::new()
                            .with_field_path(format!("messages[{}].role", i))
                            .with_source(self.name.clone()),
                    ))
                }
            };
            messages_json.push(json!({ "role": role, "text": m.content() }));
        }

        let mut completion = json!({ "stream": stream });
        if let Some(t) = options.get("temperature") {
            completion["temperature"] = t.clone();
        }
        if let Some(max) = options.get("maxTokens").or_else(|| options.get("max_tokens")) {
            completion["maxTokens"] = json!(option_text(max));
        }
        if let Some(reasoning) = options.get("reasoningOptions") {
            completion["reasoningOptions"] = reasoning.clone();
        }

        Ok(json!({
            "modelUri": self.model_uri("gpt", model),
            "completionOptions": completion,
            "messages": messages_json,
        }))
    }

    fn upstream(&self, message: impl Into<String>) -> Error {
        Error::provider(&self.name, ProviderErrorKind::Upstream, message)
    }

    async fn run_image_operation(
        &self,
        model: &str,
        prompt: &str,
        options: &Options,
    ) -> Result<Bytes> {
        let mut generation = json!({});
        if let Some(seed) = options.get("seed") {
            generation["seed"] = json!(option_text(seed));
        }
        if let Some(mime) = option_str(options, "mimeType") {
            generation["mimeType"] = json!(mime);
        }
        let width = options.get("width_ratio").or_else(|| options.get("widthRatio"));
        let height = options.get("height_ratio").or_else(|| options.get("heightRatio"));
        if let (Some(w), Some(h)) = (width, height) {
            generation["aspectRatio"] = json!({
                "widthRatio": option_text(w),
                "heightRatio": option_text(h),
            });
        }
        let body = json!({
            "modelUri": self.model_uri("art", model),
            "generationOptions": generation,
            "messages": [{ "weight": "1", "text": prompt }],
        });

        let url = join_url(&self.llm_url, "/foundationModels/v1/imageGenerationAsync");
        let response = send(&self.name, self.authorized(self.http.post(url)).json(&body)).await?;
        let mut operation = read_json(&self.name, response).await?;
        let id = operation
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| self.upstream("image operation has no id"))?
            .to_string();
        debug!(provider = %self.name, operation = %id, "image operation started");

        let mut polls = 0u32;
        while !operation.get("done").and_then(|d| d.as_bool()).unwrap_or(false) {
            tokio::time::sleep(self.poll_interval).await;
            polls += 1;
            let url = join_url(&self.operation_url, &format!("/operations/{}", id));
            let response = send(&self.name, self.authorized(self.http.get(url))).await?;
            operation = read_json(&self.name, response).await?;
        }

        if let Some(err) = operation.get("error").filter(|e| !e.is_null()) {
            return Err(vendor_error(&self.name, None, &json!({ "error": err }).to_string()));
        }
        let image = operation
            .pointer("/response/image")
            .and_then(|v| v.as_str())
            .ok_or_else(|| self.upstream(format!("operation {} finished without an image", id)))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(image)
            .map_err(|e| self.upstream(format!("image is not valid base64: {}", e)))?;
        debug!(provider = %self.name, operation = %id, polls, bytes = bytes.len(), "image operation done");
        Ok(Bytes::from(bytes))
    }
}

impl std::fmt::Debug for YandexAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YandexAdapter")
            .field("name", &self.name)
            .field("folder_id", &self.folder_id)
            .field("llm_url", &self.llm_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TextGeneration for YandexAdapter {
    async fn chat(&self, model: &str, messages: &[Message], options: &Options) -> Result<String> {
        let started = Instant::now();
        let body = self.completion_body(model, messages, options, false)?;
        let url = join_url(&self.llm_url, "/foundationModels/v1/completion");
        let response = send(&self.name, self.authorized(self.http.post(url)).json(&body)).await?;
        let json = read_json(&self.name, response).await?;

        let alternative = json
            .pointer("/result/alternatives/0")
            .ok_or_else(|| self.upstream("completion has no alternatives"))?;
        let text = alternative
            .pointer("/message/text")
            .and_then(|t| t.as_str())
            .ok_or_else(|| self.upstream("completion alternative has no text"))?
            .to_string();
        if alternative.get("status").and_then(|s| s.as_str()) == Some(STATUS_CONTENT_FILTER) {
            warn!(provider = %self.name, model = model, "completion cut by content filter");
        }
        debug!(
            provider = %self.name,
            model = model,
            chars = text.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "chat completed"
        );
        Ok(text)
    }
}

#[async_trait]
impl TextStreaming for YandexAdapter {
    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        options: &Options,
    ) -> Result<ChunkStream> {
        let body = self.completion_body(model, messages, options, true)?;
        let url = join_url(&self.llm_url, "/foundationModels/v1/completion");
        let response = send(&self.name, self.authorized(self.http.post(url)).json(&body)).await?;
        debug!(provider = %self.name, model = model, "stream opened");

        let provider = self.name.clone();
        let frames = NdjsonDecoder.decode(body_stream(&self.name, response));
        let chunks = frames
            .scan(String::new(), move |emitted, frame| {
                let out = match frame {
                    Ok(frame) => map_cumulative_frame(&provider, emitted, frame),
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(out))
            })
            .flat_map(stream::iter);
        Ok(Box::pin(chunks))
    }
}

/// Maps one cumulative completion line to incremental chunks.
///
/// `emitted` is the text already forwarded; the line's alternative text must
/// extend it. A final or content-filter status adds the finish marker after
/// the last delta. Filtered text stays ordinary text, matching `chat`.
fn map_cumulative_frame(
    provider: &str,
    emitted: &mut String,
    frame: Frame,
) -> Vec<Result<ProviderChunk>> {
    if let Some(err) = frame_error(provider, &frame) {
        return vec![Err(err)];
    }
    let value = match frame {
        Frame::Data(value) => value,
        Frame::Done => return vec![Ok(ProviderChunk::Finished)],
    };
    let Some(alternative) = value.pointer("/result/alternatives/0") else {
        return Vec::new();
    };
    let text = alternative
        .pointer("/message/text")
        .and_then(|t| t.as_str())
        .unwrap_or_default();
    let status = alternative
        .get("status")
        .and_then(|s| s.as_str())
        .unwrap_or_default();

    let mut out = Vec::with_capacity(2);
    if !text.starts_with(emitted.as_str()) {
        return vec![Err(Error::protocol_violation(format!(
            "cumulative text rewrote {} already emitted bytes",
            emitted.len()
        )))];
    }
    let delta = &text[emitted.len()..];
    if !delta.is_empty() {
        out.push(Ok(ProviderChunk::Text(delta.to_string())));
        emitted.push_str(delta);
    }
    if status == STATUS_CONTENT_FILTER {
        warn!(provider = provider, "completion cut by content filter");
    }
    if status == STATUS_FINAL || status == STATUS_CONTENT_FILTER {
        out.push(Ok(ProviderChunk::Finished));
    }
    out
}

#[async_trait]
impl Transcription for YandexAdapter {
    async fn transcribe(
        &self,
        model: &str,
        audio: AudioInput,
        options: &Options,
    ) -> Result<String> {
        let lang = option_str(options, "lang")
            .or_else(|| option_str(options, "language"))
            .unwrap_or(DEFAULT_STT_LANGUAGE)
            .to_string();
        let mut query: Vec<(String, String)> = vec![
            ("lang".to_string(), lang.clone()),
            ("topic".to_string(), model.to_string()),
            ("folderId".to_string(), self.folder_id.clone()),
        ];
        for (key, value) in options {
            if !matches!(key.as_str(), "lang" | "language" | "topic" | "folderId") {
                query.push((key.clone(), option_text(value)));
            }
        }

        debug!(
            provider = %self.name,
            lang = %lang,
            file = %audio.file_name,
            bytes = audio.data.len(),
            "sending audio to SpeechKit"
        );
        let url = join_url(&self.stt_url, "/speech/v1/stt:recognize");
        let request = self
            .http
            .post(url)
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .query(&query)
            .body(audio.data);
        let response = send(&self.name, request).await?;
        let json = read_json(&self.name, response).await?;

        if let Some(code) = json.get("error_code").and_then(|c| c.as_str()) {
            let message = json
                .get("error_message")
                .and_then(|m| m.as_str())
                .unwrap_or(code);
            let kind = ProviderErrorKind::from_provider_code(code).unwrap_or(ProviderErrorKind::Unknown);
            return Err(Error::provider(&self.name, kind, message));
        }
        let text = json
            .get("result")
            .and_then(|r| r.as_str())
            .ok_or_else(|| self.upstream(format!("recognition response has no result: {}", json)))?
            .to_string();
        debug!(provider = %self.name, chars = text.len(), "transcription completed");
        Ok(text)
    }
}

#[async_trait]
impl ImageGeneration for YandexAdapter {
    async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        count: usize,
        options: &Options,
    ) -> Result<Vec<ImagePayload>> {
        // One asynchronous operation per image, in order.
        let mut images = Vec::with_capacity(count);
        for index in 0..count {
            let bytes = self.run_image_operation(model, prompt, options).await?;
            debug!(provider = %self.name, index, "image generated");
            images.push(ImagePayload::new(bytes));
        }
        Ok(images)
    }
}

impl ProviderAdapter for YandexAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn text(&self) -> Option<&dyn TextGeneration> {
        Some(self)
    }

    fn streaming(&self) -> Option<&dyn TextStreaming> {
        Some(self)
    }

    fn transcription(&self) -> Option<&dyn Transcription> {
        Some(self)
    }

    fn images(&self) -> Option<&dyn ImageGeneration> {
        Some(self)
    }
}

pub struct YandexAdapterBuilder {
    name: String,
    api_key: Option<String>,
    folder_id: Option<String>,
    llm_url: Option<String>,
    stt_url: Option<String>,
    operation_url: Option<String>,
    poll_interval: Duration,
    connect_timeout: Duration,
}

impl YandexAdapterBuilder {
    pub fn new() -> Self {
        Self {
            name: "yandex".to_string(),
            api_key: None,
            folder_id: None,
            llm_url: None,
            stt_url: None,
            operation_url: None,
            poll_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn folder_id(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    /// Points every endpoint (completion, recognition, operations) at one host.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.llm_url = Some(url.clone());
        self.stt_url = Some(url.clone());
        self.operation_url = Some(url);
        self
    }

    pub fn llm_url(mut self, url: impl Into<String>) -> Self {
        self.llm_url = Some(url.into());
        self
    }

    pub fn stt_url(mut self, url: impl Into<String>) -> Self {
        self.stt_url = Some(url.into());
        self
    }

    pub fn operation_url(mut self, url: impl Into<String>) -> Self {
        self.operation_url = Some(url.into());
        self
    }

    /// Delay between image operation status checks (default 1s).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<YandexAdapter> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("YANDEX_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::configuration_with_context(
                    "Yandex Cloud API key required",
                    ErrorContext::new().with_field_path("providers.yandex.api_key"),
                )
            })?;
        let folder_id = self
            .folder_id
            .or_else(|| std::env::var("YANDEX_FOLDER_ID").ok())
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| {
                Error::configuration_with_context(
                    "Yandex Cloud folder id required",
                    ErrorContext::new().with_field_path("providers.yandex.folder_id"),
                )
            })?;
        let http = build_http_client(self.connect_timeout)?;
        let url = |configured: Option<String>, default: &str| match configured {
            Some(u) => check_base_url("providers.yandex.base_url", &u),
            None => Ok(default.to_string()),
        };
        let llm_url = url(self.llm_url, DEFAULT_LLM_URL)?;
        let stt_url = url(self.stt_url, DEFAULT_STT_URL)?;
        let operation_url = url(self.operation_url, DEFAULT_OPERATION_URL)?;
        info!(provider = %self.name, llm_url = %llm_url, "Yandex adapter initialized");
        Ok(YandexAdapter {
            name: self.name,
            http,
            api_key,
            folder_id,
            llm_url,
            stt_url,
            operation_url,
            poll_interval: self.poll_interval,
        })
    }
}

impl Default for YandexAdapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str, status: &str) -> Frame {
        Frame::Data(json!({
            "result": {
                "alternatives": [{"message": {"role": "assistant", "text": text}, "status": status}]
            }
        }))
    }

    fn oks(chunks: Vec<Result<ProviderChunk>>) -> Vec<ProviderChunk> {
        chunks.into_iter().map(|c| c.unwrap()).collect()
    }

    #[test]
    fn test_cumulative_text_becomes_deltas() {
        let mut emitted = String::new();
        let a = oks(map_cumulative_frame("yandex", &mut emitted, line("При", "ALTERNATIVE_STATUS_PARTIAL")));
        let b = oks(map_cumulative_frame("yandex", &mut emitted, line("Привет", "ALTERNATIVE_STATUS_PARTIAL")));
        let c = oks(map_cumulative_frame("yandex", &mut emitted, line("Привет!", STATUS_FINAL)));
        assert_eq!(a, vec![ProviderChunk::Text("При".into())]);
        assert_eq!(b, vec![ProviderChunk::Text("вет".into())]);
        assert_eq!(
            c,
            vec![ProviderChunk::Text("!".into()), ProviderChunk::Finished]
        );
        assert_eq!(emitted, "Привет!");
    }

    #[test]
    fn test_rewrite_is_violation() {
        let mut emitted = String::from("Hello");
        let out = map_cumulative_frame("yandex", &mut emitted, line("Help", "ALTERNATIVE_STATUS_PARTIAL"));
        assert_eq!(
            out[0].as_ref().unwrap_err().kind(),
            crate::error_code::ErrorKind::ProtocolViolation
        );
    }

    #[test]
    fn test_content_filter_is_text_then_finish() {
        let mut emitted = String::from("Hi");
        let out = oks(map_cumulative_frame(
            "yandex",
            &mut emitted,
            line("Hi. I can't discuss that", STATUS_CONTENT_FILTER),
        ));
        assert_eq!(
            out,
            vec![
                ProviderChunk::Text(". I can't discuss that".into()),
                ProviderChunk::Finished
            ]
        );
    }

    #[test]
    fn test_model_uri() {
        let adapter = YandexAdapter::builder()
            .api_key("k")
            .folder_id("b1g")
            .build()
            .unwrap();
        assert_eq!(adapter.model_uri("gpt", "yandexgpt-lite"), "gpt://b1g/yandexgpt-lite/latest");
        assert_eq!(adapter.model_uri("gpt", "gpt://b1g/yandexgpt/rc"), "gpt://b1g/yandexgpt/rc");
    }

    #[test]
    fn test_tool_role_rejected() {
        let adapter = YandexAdapter::builder()
            .api_key("k")
            .folder_id("b1g")
            .build()
            .unwrap();
        let err = adapter
            .completion_body("yandexgpt", &[Message::tool("{}")], &Options::new(), false)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error_code::ErrorKind::Validation);
    }
}
