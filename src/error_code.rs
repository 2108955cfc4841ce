//! Error classification: provider failure kinds and the flat error kind vocabulary.
//!
//! Two enums live here:
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`ProviderErrorKind`] | Why an adapter call failed (`auth`, `rate_limit`, `timeout`, `upstream`, `refused`, `unknown`) |
//! | [`ErrorKind`] | Flat classification of every gateway failure, carried by `StreamEvent::Error` |
//!
//! ## Example
//!
//! ```rust
//! use ai_gateway::error_code::{ErrorKind, ProviderErrorKind};
//!
//! let kind = ProviderErrorKind::from_http_status(429);
//! assert_eq!(kind, ProviderErrorKind::RateLimit);
//! assert!(kind.retryable());
//! assert_eq!(ErrorKind::from(kind).as_str(), "rate_limit");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified reason for a provider-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Invalid, expired or missing credentials, or insufficient permissions.
    Auth,
    /// Request rate or account quota exceeded.
    RateLimit,
    /// The provider did not answer in time.
    Timeout,
    /// The provider failed, was unreachable, or answered with a malformed payload.
    Upstream,
    /// The model declined to produce the requested answer.
    Refused,
    /// Anything that could not be classified.
    Unknown,
}

impl ProviderErrorKind {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::Upstream => "upstream",
            Self::Refused => "refused",
            Self::Unknown => "unknown",
        }
    }

    /// Advisory only: the gateway never retries on its own.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Timeout | Self::Upstream)
    }

    /// Maps an HTTP status code to the most likely kind.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            408 | 504 => Self::Timeout,
            429 => Self::RateLimit,
            500..=599 => Self::Upstream,
            _ => Self::Unknown,
        }
    }

    /// Maps a vendor error code/type string (OpenAI `error.code`/`error.type`,
    /// Yandex gRPC status names) to a kind.
    pub fn from_provider_code(code: &str) -> Option<Self> {
        let kind = match code {
            "invalid_api_key" | "authentication_error" | "permission_error" | "UNAUTHENTICATED"
            | "PERMISSION_DENIED" => Self::Auth,
            "rate_limit_exceeded" | "insufficient_quota" | "RESOURCE_EXHAUSTED" => Self::RateLimit,
            "timeout" | "DEADLINE_EXCEEDED" => Self::Timeout,
            "server_error" | "UNAVAILABLE" | "INTERNAL" => Self::Upstream,
            _ => return None,
        };
        Some(kind)
    }

    /// Classifies a transport-level failure.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::from_http_status(status.as_u16())
        } else if err.is_connect() || err.is_request() || err.is_body() || err.is_decode() {
            Self::Upstream
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat classification of every failure the gateway can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    TokenLimitExceeded,
    Auth,
    RateLimit,
    Timeout,
    Upstream,
    Refused,
    Unknown,
    ProtocolViolation,
    Unsupported,
    Configuration,
    Storage,
    Cancelled,
}

impl ErrorKind {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::TokenLimitExceeded => "token_limit_exceeded",
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::Upstream => "upstream",
            Self::Refused => "refused",
            Self::Unknown => "unknown",
            Self::ProtocolViolation => "protocol_violation",
            Self::Unsupported => "unsupported",
            Self::Configuration => "configuration",
            Self::Storage => "storage",
            Self::Cancelled => "cancelled",
        }
    }

    /// The provider kind behind this error kind, if it came from an adapter.
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Self::Auth => Some(ProviderErrorKind::Auth),
            Self::RateLimit => Some(ProviderErrorKind::RateLimit),
            Self::Timeout => Some(ProviderErrorKind::Timeout),
            Self::Upstream => Some(ProviderErrorKind::Upstream),
            Self::Refused => Some(ProviderErrorKind::Refused),
            Self::Unknown => Some(ProviderErrorKind::Unknown),
            _ => None,
        }
    }
}

impl From<ProviderErrorKind> for ErrorKind {
    fn from(kind: ProviderErrorKind) -> Self {
        match kind {
            ProviderErrorKind::Auth => Self::Auth,
            ProviderErrorKind::RateLimit => Self::RateLimit,
            ProviderErrorKind::Timeout => Self::Timeout,
            ProviderErrorKind::Upstream => Self::Upstream,
            ProviderErrorKind::Refused => Self::Refused,
            ProviderErrorKind::Unknown => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ProviderErrorKind::from_http_status(401), ProviderErrorKind::Auth);
        assert_eq!(ProviderErrorKind::from_http_status(403), ProviderErrorKind::Auth);
        assert_eq!(ProviderErrorKind::from_http_status(429), ProviderErrorKind::RateLimit);
        assert_eq!(ProviderErrorKind::from_http_status(504), ProviderErrorKind::Timeout);
        assert_eq!(ProviderErrorKind::from_http_status(502), ProviderErrorKind::Upstream);
        assert_eq!(ProviderErrorKind::from_http_status(418), ProviderErrorKind::Unknown);
    }

    #[test]
    fn test_provider_codes() {
        assert_eq!(
            ProviderErrorKind::from_provider_code("insufficient_quota"),
            Some(ProviderErrorKind::RateLimit)
        );
        assert_eq!(
            ProviderErrorKind::from_provider_code("UNAUTHENTICATED"),
            Some(ProviderErrorKind::Auth)
        );
        assert_eq!(ProviderErrorKind::from_provider_code("something_else"), None);
    }

    #[test]
    fn test_round_trip_through_error_kind() {
        for kind in [
            ProviderErrorKind::Auth,
            ProviderErrorKind::RateLimit,
            ProviderErrorKind::Timeout,
            ProviderErrorKind::Upstream,
            ProviderErrorKind::Refused,
            ProviderErrorKind::Unknown,
        ] {
            assert_eq!(ErrorKind::from(kind).provider_kind(), Some(kind));
        }
        assert!(!ProviderErrorKind::Refused.retryable());
        assert_eq!(ErrorKind::ProtocolViolation.provider_kind(), None);
    }
}
