//! Provider 适配层 — 按厂商原生 API 实现能力接口
//!
//! Provider adapters implementing the capability traits in [`crate::provider`]
//! against each vendor's native HTTP API. Each adapter is a plain struct built
//! with a builder; the gateway holds them as `Arc<dyn ProviderAdapter>`.
//!
//! | Adapter | Chat | Stream | Transcribe | Speech | Image |
//! |---------|------|--------|------------|--------|-------|
//! | [`OpenAiAdapter`] | ✓ | SSE | multipart | ✓ | `b64_json` / url |
//! | [`YandexAdapter`] | ✓ | NDJSON (cumulative) | SpeechKit v1 | – | async operation |

pub mod openai;
pub mod yandex;

pub use openai::{OpenAiAdapter, OpenAiAdapterBuilder};
pub use yandex::{YandexAdapter, YandexAdapterBuilder};

use crate::error_code::ProviderErrorKind;
use crate::pipeline::Frame;
use crate::types::Options;
use crate::{BoxStream, Error, ErrorContext, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::error;

/// Shared HTTP client settings for all adapters.
///
/// Only the connect phase is bounded here. Request and stream idle timeouts
/// belong to the gateway.
pub(crate) fn build_http_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(
            env::var("AI_GATEWAY_POOL_MAX_IDLE_PER_HOST")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(32),
        )
        .pool_idle_timeout(Some(Duration::from_secs(90)));

    if let Ok(proxy_url) = env::var("AI_GATEWAY_PROXY_URL") {
        if let Ok(proxy) = reqwest::Proxy::all(&proxy_url) {
            builder = builder.proxy(proxy);
        }
    }

    builder
        .build()
        .map_err(|e| Error::configuration(format!("failed to create HTTP client: {}", e)))
}

/// Sends the request; transport failures and non-2xx answers become classified errors.
pub(crate) async fn send(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::provider_transport(provider, &e))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let err = vendor_error(provider, Some(status.as_u16()), &body);
    error!(provider = provider, status = status.as_u16(), error = %err, "provider request failed");
    Err(err)
}

pub(crate) async fn read_json(provider: &str, response: reqwest::Response) -> Result<Value> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::provider_transport(provider, &e))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        Error::provider(
            provider,
            ProviderErrorKind::Upstream,
            format!("malformed JSON response: {}", e),
        )
    })
}

pub(crate) async fn read_bytes(provider: &str, response: reqwest::Response) -> Result<Bytes> {
    response
        .bytes()
        .await
        .map_err(|e| Error::provider_transport(provider, &e))
}

/// The response body as a lazily-read byte stream. Dropping it closes the connection.
pub(crate) fn body_stream(provider: &str, response: reqwest::Response) -> BoxStream<'static, Bytes> {
    let provider = provider.to_string();
    Box::pin(
        response
            .bytes_stream()
            .map_err(move |e| Error::provider_transport(provider.as_str(), &e)),
    )
}

/// Builds a classified error from a vendor error payload.
///
/// Understands OpenAI (`{"error":{"message","type","code"}}`) and Yandex
/// (`{"error":{"grpcCode","httpCode","message"}}` or top-level `code`/`message`)
/// shapes; falls back to the HTTP status.
pub(crate) fn vendor_error(provider: &str, status: Option<u16>, body: &str) -> Error {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let err_obj = parsed
        .as_ref()
        .map(|v| v.get("error").unwrap_or(v))
        .filter(|v| v.is_object());

    let code_kind = err_obj.and_then(|e| {
        ["code", "type", "status"]
            .iter()
            .filter_map(|k| e.get(*k).and_then(|c| c.as_str()))
            .find_map(ProviderErrorKind::from_provider_code)
    });
    let status = status.or_else(|| {
        err_obj
            .and_then(|e| e.get("httpCode"))
            .and_then(|c| c.as_u64())
            .map(|c| c as u16)
    });
    let kind = code_kind
        .or_else(|| status.map(ProviderErrorKind::from_http_status))
        .unwrap_or(ProviderErrorKind::Unknown);
    let message = err_obj
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string);

    match (message, status) {
        (Some(message), status) => Error::Provider {
            provider: provider.to_string(),
            kind,
            message,
            status,
        },
        (None, Some(status)) => {
            let mut err = Error::provider_status(provider, status, body);
            if let Error::Provider { kind: k, .. } = &mut err {
                *k = kind;
            }
            err
        }
        (None, None) => Error::provider(provider, kind, body.trim().to_string()),
    }
}

/// Frames that carry an `error` object mid-stream.
pub(crate) fn frame_error(provider: &str, frame: &Frame) -> Option<Error> {
    match frame {
        Frame::Data(v) => v
            .get("error")
            .filter(|e| !e.is_null())
            .map(|_| vendor_error(provider, None, &v.to_string())),
        Frame::Done => None,
    }
}

pub(crate) fn option_str<'a>(options: &'a Options, key: &str) -> Option<&'a str> {
    options.get(key).and_then(|v| v.as_str())
}

/// Form/query rendering of an option value: strings verbatim, everything else as JSON.
pub(crate) fn option_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Copies `options` into a JSON request body, skipping keys the adapter
/// sets itself.
pub(crate) fn merge_options(body: &mut Value, options: &Options, reserved: &[&str]) {
    if let Some(obj) = body.as_object_mut() {
        for (k, v) in options {
            if !reserved.contains(&k.as_str()) {
                obj.insert(k.clone(), v.clone());
            }
        }
    }
}

/// Checks a configured base URL: absolute `http`/`https` only.
pub(crate) fn check_base_url(field: &str, raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw.trim()).map_err(|e| {
        Error::configuration_with_context(
            format!("invalid base URL '{}': {}", raw, e),
            ErrorContext::new().with_field_path(field),
        )
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::configuration_with_context(
            format!("base URL must use http or https, got '{}'", parsed.scheme()),
            ErrorContext::new().with_field_path(field),
        ));
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
