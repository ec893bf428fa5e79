//! Maps upstream failures onto [`UpstreamError`].

use copilink_types::{ErrorCategory, UpstreamError};
use rquest::header::HeaderMap;
use serde_json::Value;
use std::time::Duration;

const REQUEST_ID_HEADERS: &[&str] = &["x-github-request-id", "x-request-id"];

/// Classify a non-success HTTP response.
///
/// The message comes from a structured error envelope when the body has
/// one, otherwise from a per-status default. Status and body are kept.
#[must_use]
pub fn classify(status: u16, body: &str, headers: &HeaderMap) -> UpstreamError {
    let category = ErrorCategory::from_status(status);
    let message = extract_message(body).unwrap_or_else(|| default_message(status).to_string());
    let message = if category == ErrorCategory::BadRequest {
        with_bad_request_hints(message)
    } else {
        message
    };
    UpstreamError {
        status_code: status,
        message,
        category,
        raw_body: (!body.is_empty()).then(|| body.to_string()),
        retry_after: header_str(headers, "retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs),
        request_id: REQUEST_ID_HEADERS
            .iter()
            .find_map(|h| header_str(headers, h))
            .map(str::to_string),
    }
}

/// Classify an `error` object delivered inside an otherwise healthy stream.
///
/// A numeric `code` in the HTTP range is used as the status; anything else
/// is reported as 500.
#[must_use]
pub fn classify_stream_error(error: &Value) -> UpstreamError {
    let status = error
        .get("code")
        .and_then(|c| c.as_u64().or_else(|| c.as_str()?.parse().ok()))
        .and_then(|c| u16::try_from(c).ok())
        .filter(|c| (400..=599).contains(c))
        .unwrap_or(500);
    let envelope = serde_json::json!({ "error": error }).to_string();
    let mut classified = classify(status, &envelope, &HeaderMap::new());
    classified.raw_body = Some(error.to_string());
    classified
}

/// Pull a human-readable message out of the known error envelopes:
/// `{"error":{"message":..}}`, `{"error":".."}` and `{"message":..}`.
fn extract_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    let message = match json.get("error") {
        Some(Value::Object(err)) => err.get("message").and_then(Value::as_str),
        Some(Value::String(s)) => Some(s.as_str()),
        _ => None,
    }
    .or_else(|| json.get("message").and_then(Value::as_str))?;
    let message = message.trim();
    (!message.is_empty()).then(|| message.to_string())
}

fn default_message(status: u16) -> &'static str {
    match status {
        400 => "Bad request",
        401 => "Unauthorized: the Copilot API key was rejected",
        403 => "Forbidden: the account has no access to this Copilot model or feature",
        404 => "Not found: unknown model or endpoint",
        408 => "Request timed out",
        429 => "Rate limited by the Copilot API",
        500..=599 => "Copilot API server error",
        _ => "Unexpected response from the Copilot API",
    }
}

fn with_bad_request_hints(message: String) -> String {
    format!(
        "{message} (likely causes: a mandated field such as `stream`, `intent` or `n` \
         is missing, or tool-call arguments are not valid JSON)"
    )
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
