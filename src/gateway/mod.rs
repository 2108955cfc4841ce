//! 调度模块：按配置路由请求、在任何网络调用之前执行 token 预算检查。
//!
//! # Gateway
//!
//! The dispatcher. For every request it
//!
//! 1. looks up the route for the model name (explicit configuration only),
//! 2. checks that the routed adapter declares the requested capability,
//! 3. enforces the token budget (chat, structured chat and streaming only),
//! 4. calls the adapter under the configured timeout,
//! 5. shapes the result: text, an [`EventStream`], or [`BinaryOutput`]s.
//!
//! Adapter failures are returned unchanged; nothing is retried.
//!
//! ```rust,no_run
//! use ai_gateway::{Gateway, GatewayConfig, Message};
//!
//! # async fn run() -> ai_gateway::Result<()> {
//! let config = GatewayConfig::from_env()?;
//! let gateway = Gateway::from_config(&config)?;
//! let request = gateway.request("gpt-4.1-nano", vec![Message::user("Hi!")]);
//! let text = gateway.chat(&request).await?;
//! println!("{text}");
//! # Ok(())
//! # }
//! ```

mod builder;

pub use builder::GatewayBuilder;

use crate::config::GatewayConfig;
use crate::pipeline::{EventStream, StreamPipeline};
use crate::provider::{Capability, ProviderAdapter};
use crate::storage::{self, OutputStore};
use crate::structured::JsonSchemaFormat;
use crate::tokens::TokenAccountant;
use crate::types::{
    BinaryOutput, GenerationRequest, ImageRequest, Message, SpeechRequest, TokenBudget,
    TranscriptionRequest,
};
use crate::{Error, ErrorContext, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// A configured model → provider mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub model: String,
    pub provider: String,
    /// Effective prompt ceiling for requests built with [`Gateway::request`].
    pub max_prompt_tokens: Option<usize>,
}

pub struct Gateway {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    routes: HashMap<String, Route>,
    accountant: TokenAccountant,
    pipeline: StreamPipeline,
    store: OutputStore,
    timeout: Option<Duration>,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        GatewayBuilder::from_config(config)?.build()
    }

    pub fn accountant(&self) -> &TokenAccountant {
        &self.accountant
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    /// Routes sorted by model name.
    pub fn routes(&self) -> Vec<&Route> {
        let mut routes: Vec<&Route> = self.routes.values().collect();
        routes.sort_by(|a, b| a.model.cmp(&b.model));
        routes
    }

    pub fn adapter(&self, provider: &str) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider)
    }

    /// The budget a route applies. Unrouted models get an unlimited budget;
    /// dispatching them fails anyway.
    pub fn budget_for(&self, model: &str) -> TokenBudget {
        match self.routes.get(model).and_then(|r| r.max_prompt_tokens) {
            Some(limit) => TokenBudget::limited(model, limit),
            None => TokenBudget::unlimited(model),
        }
    }

    /// A chat request carrying the route's budget.
    pub fn request(&self, model: &str, messages: Vec<Message>) -> GenerationRequest {
        GenerationRequest::new(model, messages, self.budget_for(model))
    }

    pub fn enforce_budget(&self, messages: &[Message], budget: &TokenBudget) -> Result<()> {
        self.accountant.enforce_budget(messages, budget)
    }

    pub async fn chat(&self, request: &GenerationRequest) -> Result<String> {
        let (route, adapter) = self.resolve(&request.model_name)?;
        let text = adapter
            .text()
            .ok_or_else(|| unsupported(route, Capability::Chat))?;
        self.enforce_budget(&request.messages, &request.budget)?;

        let start = Instant::now();
        let result = self
            .bounded(
                &route.provider,
                text.chat(&route.model, &request.messages, &request.options),
            )
            .await;
        log_outcome(Capability::Chat, route, start, &result);
        result
    }

    /// Opens a normalized event stream. Budget and connection failures are
    /// returned here; failures after the first byte arrive as the terminal
    /// [`StreamEvent::Error`](crate::StreamEvent::Error).
    pub async fn chat_stream(&self, request: &GenerationRequest) -> Result<EventStream> {
        let (route, adapter) = self.resolve(&request.model_name)?;
        let streaming = adapter
            .streaming()
            .ok_or_else(|| unsupported(route, Capability::ChatStream))?;
        self.enforce_budget(&request.messages, &request.budget)?;

        let start = Instant::now();
        let result = self
            .bounded(
                &route.provider,
                streaming.chat_stream(&route.model, &request.messages, &request.options),
            )
            .await;
        log_outcome(Capability::ChatStream, route, start, &result);
        Ok(self.pipeline.run(&route.provider, result?))
    }

    /// Chat constrained to `format`; returns the parsed JSON answer.
    pub async fn chat_structured(
        &self,
        request: &GenerationRequest,
        format: &JsonSchemaFormat,
    ) -> Result<Value> {
        let (route, adapter) = self.resolve(&request.model_name)?;
        let structured = adapter
            .structured()
            .ok_or_else(|| unsupported(route, Capability::StructuredChat))?;
        format.validate()?;
        self.enforce_budget(&request.messages, &request.budget)?;

        let start = Instant::now();
        let result = self
            .bounded(
                &route.provider,
                structured.chat_structured(&route.model, &request.messages, &request.options, format),
            )
            .await;
        log_outcome(Capability::StructuredChat, route, start, &result);
        result
    }

    pub async fn transcribe(&self, request: &TranscriptionRequest) -> Result<String> {
        let (route, adapter) = self.resolve(&request.model_name)?;
        let transcription = adapter
            .transcription()
            .ok_or_else(|| unsupported(route, Capability::Transcribe))?;
        let audio = request.audio.load().await?;
        debug!(file_name = %audio.file_name, bytes = audio.data.len(), "audio loaded");

        let start = Instant::now();
        let result = self
            .bounded(
                &route.provider,
                transcription.transcribe(&route.model, audio, &request.options),
            )
            .await;
        log_outcome(Capability::Transcribe, route, start, &result);
        result
    }

    pub async fn synthesize_speech(&self, request: &SpeechRequest) -> Result<BinaryOutput> {
        let (route, adapter) = self.resolve(&request.model_name)?;
        let speech = adapter
            .speech()
            .ok_or_else(|| unsupported(route, Capability::SynthesizeSpeech))?;
        if request.text.trim().is_empty() {
            return Err(Error::validation_with_context(
                "speech text must not be empty",
                ErrorContext::new().with_field_path("speech.text"),
            ));
        }
        if let Some(name) = &request.overwrite_name {
            if request.as_bytes {
                return Err(Error::validation_with_context(
                    "overwrite name cannot be combined with a bytes result",
                    ErrorContext::new().with_field_path("speech.overwrite_name"),
                ));
            }
            storage::validate_file_name(name)?;
        }

        let start = Instant::now();
        let result = self
            .bounded(
                &route.provider,
                speech.synthesize_speech(&route.model, &request.text, &request.options),
            )
            .await;
        log_outcome(Capability::SynthesizeSpeech, route, start, &result);
        let audio = result?;

        if request.as_bytes {
            return Ok(BinaryOutput::Bytes(audio.data));
        }
        let stored = self
            .store
            .store_speech(&audio, request.overwrite_name.as_deref())
            .await?;
        Ok(BinaryOutput::Stored(stored))
    }

    /// Results are in generation order; stored files are named `image_{i}`.
    pub async fn generate_image(&self, request: &ImageRequest) -> Result<Vec<BinaryOutput>> {
        let (route, adapter) = self.resolve(&request.model_name)?;
        let images = adapter
            .images()
            .ok_or_else(|| unsupported(route, Capability::GenerateImage))?;
        if request.count == 0 {
            return Err(Error::validation_with_context(
                "image count must be at least 1",
                ErrorContext::new().with_field_path("image.count"),
            ));
        }

        let start = Instant::now();
        let result = self
            .bounded(
                &route.provider,
                images.generate_image(&route.model, &request.prompt, request.count, &request.options),
            )
            .await;
        log_outcome(Capability::GenerateImage, route, start, &result);
        let payloads = result?;

        if request.as_bytes {
            return Ok(payloads
                .into_iter()
                .map(|p| BinaryOutput::Bytes(p.data))
                .collect());
        }
        let stored = self.store.store_images(&payloads).await?;
        Ok(stored.into_iter().map(BinaryOutput::Stored).collect())
    }

    fn resolve(&self, model: &str) -> Result<(&Route, &Arc<dyn ProviderAdapter>)> {
        let route = self.routes.get(model).ok_or_else(|| {
            Error::configuration_with_context(
                format!("no route configured for model '{}'", model),
                ErrorContext::new()
                    .with_field_path("model_name")
                    .with_source("gateway"),
            )
        })?;
        let adapter = self.adapters.get(&route.provider).ok_or_else(|| {
            Error::configuration(format!(
                "route for '{}' names unregistered provider '{}'",
                model, route.provider
            ))
        })?;
        Ok((route, adapter))
    }

    async fn bounded<T, F>(&self, provider: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| Error::timeout(provider, limit))?,
            None => call.await,
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("providers", &self.adapters.keys().collect::<Vec<_>>())
            .field("routes", &self.routes.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn unsupported(route: &Route, capability: Capability) -> Error {
    Error::Unsupported {
        provider: route.provider.clone(),
        capability,
    }
}

fn log_outcome<T>(capability: Capability, route: &Route, start: Instant, result: &Result<T>) {
    let duration_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(_) => info!(
            capability = capability.as_str(),
            model = route.model.as_str(),
            provider = route.provider.as_str(),
            duration_ms,
            "dispatch succeeded"
        ),
        Err(e) => error!(
            capability = capability.as_str(),
            model = route.model.as_str(),
            provider = route.provider.as_str(),
            kind = e.kind().as_str(),
            duration_ms,
            error = %e,
            "dispatch failed"
        ),
    }
}
