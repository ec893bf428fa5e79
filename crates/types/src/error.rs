//! Unified error type for the copilink workspace.

use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use thiserror::Error;

/// Failure taxonomy surfaced to the outer gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Device flow or API-key refresh exhausted its retries.
    Auth,
    /// HTTP 400.
    BadRequest,
    /// HTTP 401.
    Unauthorized,
    /// HTTP 403.
    Forbidden,
    /// HTTP 404.
    NotFound,
    /// HTTP 429.
    RateLimited,
    /// HTTP 5xx.
    UpstreamServer,
    /// Malformed streaming event envelope.
    StreamDecode,
    Unknown,
}

impl ErrorCategory {
    /// Map an upstream HTTP status to its category.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            500..=599 => Self::UpstreamServer,
            _ => Self::Unknown,
        }
    }

    /// Stable snake-case name, also used as the wire `type` of API errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth_error",
            Self::BadRequest => "bad_request_error",
            Self::Unauthorized => "unauthorized_error",
            Self::Forbidden => "forbidden_error",
            Self::NotFound => "not_found_error",
            Self::RateLimited => "rate_limited_error",
            Self::UpstreamServer => "upstream_server_error",
            Self::StreamDecode => "stream_decode_error",
            Self::Unknown => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified upstream failure. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError {
    pub status_code: u16,
    pub message: String,
    pub category: ErrorCategory,
    /// Raw response body, kept for diagnostics.
    pub raw_body: Option<String>,
    /// Parsed `retry-after` header, if the upstream sent one.
    pub retry_after: Option<Duration>,
    /// Upstream request identifier, if the upstream sent one.
    pub request_id: Option<String>,
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (status {}): {}",
            self.category, self.status_code, self.message
        )
    }
}

/// Enumerates all error kinds that can occur across copilink crates.
#[derive(Debug, Error)]
pub enum CopilinkError {
    /// Device authorization or API-key refresh failed after all retries.
    #[error("authentication error: {0}")]
    Auth(String),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credential persistence error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested model is not served by the upstream.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// The upstream returned a non-success status.
    #[error("upstream error: {0}")]
    Upstream(Box<UpstreamError>),

    /// A streaming event could not be decoded; the stream is terminated.
    #[error("stream decode error: {0}")]
    StreamDecode(String),
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "rquest")]
impl From<rquest::Error> for CopilinkError {
    fn from(e: rquest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<UpstreamError> for CopilinkError {
    fn from(e: UpstreamError) -> Self {
        Self::Upstream(Box::new(e))
    }
}

impl CopilinkError {
    /// The taxonomy bucket this error is reported under.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth(_) => ErrorCategory::Auth,
            Self::Upstream(e) => e.category,
            Self::StreamDecode(_) => ErrorCategory::StreamDecode,
            Self::UnsupportedModel(_) => ErrorCategory::NotFound,
            Self::Http(_)
            | Self::Serialization(_)
            | Self::Storage(_)
            | Self::Config(_) => ErrorCategory::Unknown,
        }
    }

    /// The preserved upstream status code, if this error came from one.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Upstream(e) => Some(e.status_code),
            _ => None,
        }
    }

    /// Returns `true` if the error is likely transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream(e) => matches!(e.status_code, 408 | 429 | 500..=599),
            Self::Http(_) => true,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CopilinkError>;
