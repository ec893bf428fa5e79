//! API error type that maps [`CopilinkError`] categories to HTTP status codes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use copilink_types::{CopilinkError, ErrorCategory};
use serde_json::json;

/// Wrapper around [`CopilinkError`] that implements [`IntoResponse`].
pub struct ApiError(pub CopilinkError);

impl ApiError {
    /// Returns `(status, error_type, error_code)` for the wrapped error.
    fn classify(&self) -> (StatusCode, &'static str, &'static str) {
        if let CopilinkError::Http(_) = self.0 {
            return (StatusCode::BAD_GATEWAY, "server_error", "upstream_unreachable");
        }
        let category = self.0.category();
        let code = category.as_str();
        match category {
            ErrorCategory::Auth | ErrorCategory::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "authentication_error", code)
            }
            ErrorCategory::Forbidden => (StatusCode::FORBIDDEN, "permission_error", code),
            ErrorCategory::NotFound => (StatusCode::NOT_FOUND, "invalid_request_error", code),
            ErrorCategory::BadRequest => (StatusCode::BAD_REQUEST, "invalid_request_error", code),
            ErrorCategory::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_error", code),
            ErrorCategory::UpstreamServer | ErrorCategory::StreamDecode => {
                (StatusCode::BAD_GATEWAY, "server_error", code)
            }
            ErrorCategory::Unknown => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", code),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, error_code) = self.classify();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self.0, "request rejected");
        }
        let mut response = (
            status,
            Json(json!({
                "error": {
                    "message": self.0.to_string(),
                    "type": error_type,
                    "code": error_code,
                }
            })),
        )
            .into_response();
        if let CopilinkError::Upstream(e) = &self.0
            && let Some(retry_after) = e.retry_after
        {
            response
                .headers_mut()
                .insert("retry-after", retry_after.as_secs().into());
        }
        response
    }
}

impl From<CopilinkError> for ApiError {
    fn from(e: CopilinkError) -> Self {
        Self(e)
    }
}
