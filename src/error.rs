use crate::error_code::{ErrorKind, ProviderErrorKind};
use crate::provider::Capability;
use std::time::Duration;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "routes[0].provider", "audio.filename")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_loader", "output_store")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the gateway.
///
/// Every failure is classified; see [`Error::kind`]. Provider failures are
/// propagated as-is and never retried by the gateway.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Token limit exceeded for model '{model}': {actual}/{limit}")]
    TokenLimitExceeded {
        actual: usize,
        limit: usize,
        model: String,
    },

    #[error("Provider error from '{provider}' ({kind}){}: {message}", .status.as_ref().map(|s| format!(", HTTP {}", s)).unwrap_or_default())]
    Provider {
        provider: String,
        kind: ProviderErrorKind,
        message: String,
        status: Option<u16>,
    },

    #[error("Stream protocol violation: {message}")]
    ProtocolViolation { message: String },

    #[error("Capability '{capability}' is not supported by provider '{provider}'")]
    Unsupported {
        provider: String,
        capability: Capability,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Stream cancelled by consumer")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::validation_with_context(msg, ErrorContext::new())
    }

    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::configuration_with_context(msg, ErrorContext::new())
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn provider(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        msg: impl Into<String>,
    ) -> Self {
        Error::Provider {
            provider: provider.into(),
            kind,
            message: msg.into(),
            status: None,
        }
    }

    /// Non-2xx response from a vendor API.
    pub fn provider_status(provider: impl Into<String>, status: u16, body: &str) -> Self {
        Error::Provider {
            provider: provider.into(),
            kind: ProviderErrorKind::from_http_status(status),
            message: truncate_body(body),
            status: Some(status),
        }
    }

    /// Transport failure while talking to a vendor API.
    pub fn provider_transport(provider: impl Into<String>, err: &reqwest::Error) -> Self {
        Error::Provider {
            provider: provider.into(),
            kind: ProviderErrorKind::from_reqwest(err),
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }

    pub fn timeout(provider: impl Into<String>, after: Duration) -> Self {
        Error::Provider {
            provider: provider.into(),
            kind: ProviderErrorKind::Timeout,
            message: format!("no response within {} ms", after.as_millis()),
            status: None,
        }
    }

    pub fn protocol_violation(msg: impl Into<String>) -> Self {
        Error::ProtocolViolation {
            message: msg.into(),
        }
    }

    /// Rebuilds an error from a terminal stream event.
    pub fn from_stream_failure(provider: &str, kind: ErrorKind, message: String) -> Self {
        if let Some(provider_kind) = kind.provider_kind() {
            return Error::provider(provider, provider_kind, message);
        }
        match kind {
            ErrorKind::ProtocolViolation => Error::ProtocolViolation { message },
            ErrorKind::Cancelled => Error::Cancelled,
            ErrorKind::Validation => Error::validation(message),
            ErrorKind::Configuration => Error::configuration(message),
            _ => Error::provider(provider, ProviderErrorKind::Unknown, message),
        }
    }

    /// Flat classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::TokenLimitExceeded { .. } => ErrorKind::TokenLimitExceeded,
            Error::Provider { kind, .. } => ErrorKind::from(*kind),
            Error::ProtocolViolation { .. } => ErrorKind::ProtocolViolation,
            Error::Unsupported { .. } => ErrorKind::Unsupported,
            Error::Configuration { .. } => ErrorKind::Configuration,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Io(_) => ErrorKind::Storage,
            // Request bodies are built in-process; malformed JSON comes from the vendor.
            Error::Serialization(_) => ErrorKind::Upstream,
        }
    }

    /// Advisory retry hint for the caller's policy. The gateway itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Provider { kind, .. } => kind.retryable(),
            _ => false,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Validation { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 512;
    let trimmed = body.trim();
    if trimmed.len() <= MAX {
        return trimmed.to_string();
    }
    let mut end = MAX;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}
