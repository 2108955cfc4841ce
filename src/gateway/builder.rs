use super::{Gateway, Route};
use crate::config::{self, GatewayConfig};
use crate::drivers::{OpenAiAdapter, YandexAdapter};
use crate::pipeline::StreamPipeline;
use crate::provider::ProviderAdapter;
use crate::storage::OutputStore;
use crate::tokens::TokenAccountant;
use crate::{Error, ErrorContext, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Builder for [`Gateway`].
///
/// Adapters are registered under their [`ProviderAdapter::name`]; routes map
/// a model name to one of those names.
pub struct GatewayBuilder {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    routes: Vec<(String, String, Option<Option<usize>>)>,
    default_max_prompt_tokens: Option<usize>,
    timeout: Option<Duration>,
    pipeline: StreamPipeline,
    store: Option<OutputStore>,
    accountant: Option<TokenAccountant>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            routes: Vec::new(),
            default_max_prompt_tokens: Some(1024),
            timeout: Some(Duration::from_secs(60)),
            pipeline: StreamPipeline::new().with_idle_timeout(Duration::from_secs(30)),
            store: None,
            accountant: None,
        }
    }

    /// Registers an adapter. A later adapter with the same name replaces the earlier one.
    pub fn adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.name().to_string(), adapter);
        self
    }

    /// Routes `model` to `provider` with the default prompt ceiling.
    pub fn route(mut self, model: impl Into<String>, provider: impl Into<String>) -> Self {
        self.routes.push((model.into(), provider.into(), None));
        self
    }

    /// Routes `model` to `provider` with its own ceiling; `None` disables the check.
    pub fn route_with_limit(
        mut self,
        model: impl Into<String>,
        provider: impl Into<String>,
        max_prompt_tokens: Option<usize>,
    ) -> Self {
        self.routes
            .push((model.into(), provider.into(), Some(max_prompt_tokens)));
        self
    }

    pub fn default_max_prompt_tokens(mut self, limit: Option<usize>) -> Self {
        self.default_max_prompt_tokens = limit;
        self
    }

    /// Per-call timeout for adapter operations. `None` waits indefinitely.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum gap between stream chunks. `None` disables the idle check.
    pub fn stream_idle_timeout(mut self, idle: Option<Duration>) -> Self {
        self.pipeline = match idle {
            Some(idle) => StreamPipeline::new().with_idle_timeout(idle),
            None => StreamPipeline::new(),
        };
        self
    }

    pub fn output_store(mut self, store: OutputStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Shares an accountant (and its encoder cache) with other components.
    pub fn accountant(mut self, accountant: TokenAccountant) -> Self {
        self.accountant = Some(accountant);
        self
    }

    /// Adapters, routes and limits from a loaded [`GatewayConfig`].
    ///
    /// A provider is registered only when its credentials resolve; explicit
    /// routes to an unregistered provider fail at [`build`](Self::build).
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let mut builder = Self::new()
            .default_max_prompt_tokens(config.default_max_prompt_tokens)
            .timeout(config.request_timeout())
            .stream_idle_timeout(config.stream_idle_timeout())
            .output_store(OutputStore::new(
                config.output.audio_dir.clone(),
                config.output.image_dir.clone(),
            ));

        let openai = &config.providers.openai;
        if let Some(key) = config::resolve_api_key(config::OPENAI, openai.api_key.as_deref()) {
            let mut adapter = OpenAiAdapter::builder().name(config::OPENAI).api_key(key);
            if let Some(url) = &openai.base_url {
                adapter = adapter.base_url(url.clone());
            }
            builder = builder.adapter(Arc::new(adapter.build()?));
        } else {
            warn!(provider = config::OPENAI, "no API key configured; provider disabled");
        }

        let yandex = &config.providers.yandex;
        let yandex_key = config::resolve_api_key(config::YANDEX, yandex.api_key.as_deref());
        match (yandex_key, yandex.folder_id.as_deref()) {
            (Some(key), Some(folder)) => {
                let mut adapter = YandexAdapter::builder()
                    .name(config::YANDEX)
                    .api_key(key)
                    .folder_id(folder);
                if let Some(url) = &yandex.base_url {
                    adapter = adapter.base_url(url.clone());
                }
                builder = builder.adapter(Arc::new(adapter.build()?));
            }
            _ => warn!(
                provider = config::YANDEX,
                "API key or folder id missing; provider disabled"
            ),
        }

        let available: Vec<&str> = builder.adapters.keys().map(String::as_str).collect();
        let routes = config.resolved_routes(&available);
        for route in routes {
            builder
                .routes
                .push((route.model, route.provider, route.max_prompt_tokens));
        }
        Ok(builder)
    }

    pub fn build(self) -> Result<Gateway> {
        let mut routes = HashMap::with_capacity(self.routes.len());
        for (model, provider, limit) in self.routes {
            if !self.adapters.contains_key(&provider) {
                return Err(Error::configuration_with_context(
                    format!("model '{}' routes to unknown provider '{}'", model, provider),
                    ErrorContext::new()
                        .with_field_path("routes")
                        .with_source("gateway_builder"),
                ));
            }
            if routes.contains_key(&model) {
                return Err(Error::configuration_with_context(
                    format!("model '{}' is routed more than once", model),
                    ErrorContext::new()
                        .with_field_path("routes")
                        .with_source("gateway_builder"),
                ));
            }
            let max_prompt_tokens = limit.unwrap_or(self.default_max_prompt_tokens);
            routes.insert(
                model.clone(),
                Route {
                    model,
                    provider,
                    max_prompt_tokens,
                },
            );
        }

        info!(
            providers = self.adapters.len(),
            routes = routes.len(),
            timeout_ms = self.timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
            "gateway ready"
        );

        Ok(Gateway {
            adapters: self.adapters,
            routes,
            accountant: self.accountant.unwrap_or_default(),
            pipeline: self.pipeline,
            store: self
                .store
                .unwrap_or_else(|| OutputStore::new("data/audio", "data/images")),
            timeout: self.timeout,
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
