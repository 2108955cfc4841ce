//! 配置模块：从 YAML 文件与环境变量加载网关配置。
//!
//! # Gateway Configuration
//!
//! ```yaml
//! timeout_secs: 60
//! stream_idle_timeout_secs: 30
//! default_max_prompt_tokens: 1024   # `~` disables budget checks by default
//! output:
//!   audio_dir: data/audio
//!   image_dir: data/images
//! providers:
//!   openai: { api_key: sk-..., base_url: https://api.openai.com }
//!   yandex: { api_key: AQVN..., folder_id: b1g... }
//! routes:
//!   - { model: gpt-4.1-nano, provider: openai, max_prompt_tokens: 4048 }
//!   - { model: yandexgpt, provider: yandex, max_prompt_tokens: ~ }
//! ```
//!
//! When `routes` is empty the built-in model table is used for every
//! provider that has credentials.
//!
//! ## Environment
//!
//! | Variable | Field |
//! |----------|-------|
//! | `OPENAI_API_KEY`, `OPENAI_BASE_URL` | `providers.openai` |
//! | `YANDEX_API_KEY`, `YANDEX_FOLDER_ID` | `providers.yandex` |
//! | `AI_GATEWAY_TIMEOUT_SECS` | `timeout_secs` |
//! | `AI_GATEWAY_STREAM_IDLE_TIMEOUT_SECS` | `stream_idle_timeout_secs` |
//! | `AI_GATEWAY_MAX_PROMPT_TOKENS` | `default_max_prompt_tokens` (`none` disables) |
//! | `AI_GATEWAY_AUDIO_DIR`, `AI_GATEWAY_IMAGE_DIR` | `output` |
//!
//! API keys not present in the file or environment are looked up in the OS
//! keyring (service `ai-gateway`, user = provider name).

use crate::{Error, ErrorContext, Result};
use keyring::Entry;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const OPENAI: &str = "openai";
pub const YANDEX: &str = "yandex";

const KEYRING_SERVICE: &str = "ai-gateway";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Per-request timeout for adapter calls, in seconds. `0` disables it.
    pub timeout_secs: u64,
    /// Maximum gap between two stream chunks, in seconds. `0` disables it.
    pub stream_idle_timeout_secs: u64,
    /// Prompt token ceiling for routes without their own.
    pub default_max_prompt_tokens: Option<usize>,
    pub output: OutputConfig,
    pub providers: ProvidersConfig,
    pub routes: Vec<RouteConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            stream_idle_timeout_secs: 30,
            default_max_prompt_tokens: Some(1024),
            output: OutputConfig::default(),
            providers: ProvidersConfig::default(),
            routes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub audio_dir: PathBuf,
    pub image_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            audio_dir: PathBuf::from("data/audio"),
            image_dir: PathBuf::from("data/images"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: OpenAiConfig,
    pub yandex: YandexConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct YandexConfig {
    pub api_key: Option<String>,
    pub folder_id: Option<String>,
    /// Overrides every Yandex endpoint host (testing and private installations).
    pub base_url: Option<String>,
}

/// Explicit model → provider mapping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteConfig {
    pub model: String,
    pub provider: String,
    /// Absent: inherit the default ceiling. `~`: no ceiling. Number: this ceiling.
    #[serde(default, deserialize_with = "explicit_option")]
    pub max_prompt_tokens: Option<Option<usize>>,
}

impl RouteConfig {
    pub fn new(model: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            provider: provider.into(),
            max_prompt_tokens: None,
        }
    }
}

fn explicit_option<'de, D>(deserializer: D) -> std::result::Result<Option<Option<usize>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<usize>::deserialize(deserializer).map(Some)
}

impl GatewayConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: GatewayConfig = serde_yaml::from_str(content).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid gateway config: {}", e),
                ErrorContext::new().with_source("config_loader"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a YAML file, then fills gaps and overrides from the environment.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::configuration_with_context(
                format!("failed to read config: {}", e),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("config_loader"),
            )
        })?;
        let config = Self::from_yaml_str(&content)?.apply_env()?;
        debug!(path = %path.display(), routes = config.routes.len(), "gateway config loaded");
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        Self::default().apply_env()
    }

    /// Credentials and base URLs are taken from the environment only when the
    /// config leaves them unset; numeric settings and directories are
    /// overridden when the variable is present.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let providers = &mut self.providers;
        fill(&mut providers.openai.api_key, var("OPENAI_API_KEY"));
        fill(&mut providers.openai.base_url, var("OPENAI_BASE_URL"));
        fill(&mut providers.yandex.api_key, var("YANDEX_API_KEY"));
        fill(&mut providers.yandex.folder_id, var("YANDEX_FOLDER_ID"));

        if let Some(v) = var("AI_GATEWAY_TIMEOUT_SECS") {
            self.timeout_secs = parse_number("AI_GATEWAY_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("AI_GATEWAY_STREAM_IDLE_TIMEOUT_SECS") {
            self.stream_idle_timeout_secs = parse_number("AI_GATEWAY_STREAM_IDLE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("AI_GATEWAY_MAX_PROMPT_TOKENS") {
            self.default_max_prompt_tokens = if v.trim().eq_ignore_ascii_case("none") {
                None
            } else {
                Some(parse_number("AI_GATEWAY_MAX_PROMPT_TOKENS", &v)?)
            };
        }
        if let Some(v) = var("AI_GATEWAY_AUDIO_DIR") {
            self.output.audio_dir = PathBuf::from(v);
        }
        if let Some(v) = var("AI_GATEWAY_IMAGE_DIR") {
            self.output.image_dir = PathBuf::from(v);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (i, route) in self.routes.iter().enumerate() {
            if route.model.trim().is_empty() {
                return Err(Error::configuration_with_context(
                    "route model must not be empty",
                    ErrorContext::new().with_field_path(format!("routes[{}].model", i)),
                ));
            }
            if !seen.insert(route.model.as_str()) {
                return Err(Error::configuration_with_context(
                    format!("model '{}' is routed more than once", route.model),
                    ErrorContext::new().with_field_path(format!("routes[{}].model", i)),
                ));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        (self.stream_idle_timeout_secs > 0).then(|| Duration::from_secs(self.stream_idle_timeout_secs))
    }

    /// Configured routes, or the built-in table restricted to `available` providers.
    pub fn resolved_routes(&self, available: &[&str]) -> Vec<RouteConfig> {
        if !self.routes.is_empty() {
            return self.routes.clone();
        }
        default_routes()
            .into_iter()
            .filter(|r| available.contains(&r.provider.as_str()))
            .collect()
    }
}

/// Built-in model table.
pub fn default_routes() -> Vec<RouteConfig> {
    [
        ("gpt-4.1-nano", OPENAI),
        ("gpt-4o-mini-transcribe", OPENAI),
        ("gpt-4o-mini-tts", OPENAI),
        ("gpt-image-1", OPENAI),
        ("yandexgpt", YANDEX),
        ("yandexgpt-lite", YANDEX),
        ("yandex-art", YANDEX),
        ("general", YANDEX),
    ]
    .into_iter()
    .map(|(model, provider)| RouteConfig::new(model, provider))
    .collect()
}

/// Resolves a provider API key: explicit value, then OS keyring, then
/// `<PROVIDER>_API_KEY`.
pub fn resolve_api_key(provider: &str, configured: Option<&str>) -> Option<String> {
    if let Some(key) = configured.filter(|k| !k.trim().is_empty()) {
        return Some(key.to_string());
    }
    if let Ok(entry) = Entry::new(KEYRING_SERVICE, provider) {
        if let Ok(key) = entry.get_password() {
            debug!(provider = provider, "API key loaded from keyring");
            return Some(key);
        }
    }
    std::env::var(format!("{}_API_KEY", provider.to_uppercase()))
        .ok()
        .filter(|k| !k.trim().is_empty())
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value.filter(|v| !v.trim().is_empty());
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        Error::configuration_with_context(
            format!("{} must be a non-negative integer, got '{}'", name, value),
            ErrorContext::new().with_field_path(name),
        )
    })
}
