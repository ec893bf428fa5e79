//! GitHub Copilot device code authorization flow.
//!
//! Implements the OAuth 2.0 Device Authorization Grant used by GitHub Copilot,
//! plus the exchange of the resulting access token for a short-lived API key.
//! No local callback port is needed for this flow.

use copilink_types::{ApiKey, CopilinkError, traits::Result, unix_now};
use serde_json::Value;

/// GitHub device code request endpoint.
pub const DEVICE_CODE_URL: &str = "https://github.com/login/device/code";

/// GitHub OAuth token endpoint.
pub const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";

/// Endpoint minting a short-lived Copilot API key from the access token.
pub const API_KEY_URL: &str = "https://api.github.com/copilot_internal/v2/token";

/// Public OAuth client ID for GitHub Copilot.
pub const CLIENT_ID: &str = "Iv1.b507a08c87ecfe98";

/// OAuth scopes requested during authorization.
pub const SCOPES: &[&str] = &["read:user"];

pub const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Lifetime assumed for an API key whose response omits `expires_at`.
const DEFAULT_KEY_TTL_SECS: i64 = 1500;

/// Parsed response from the device code request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodeResponse {
    /// Unique device verification code.
    pub device_code: String,
    /// Short code the user enters at the verification URI.
    pub user_code: String,
    /// URL where the user authorizes the device.
    pub verification_uri: String,
    /// Seconds until the device code expires.
    pub expires_in: u64,
    /// Minimum polling interval in seconds.
    pub interval: u64,
}

/// Result of one poll against the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The user approved; carries the access token.
    Granted(String),
    /// Not approved yet (`authorization_pending` or `slow_down`).
    Pending,
}

/// Parse the device code endpoint JSON response.
///
/// # Errors
///
/// Returns an error if `device_code` or `user_code` is missing.
pub fn parse_device_code_response(json: &Value) -> Result<DeviceCodeResponse> {
    Ok(DeviceCodeResponse {
        device_code: json
            .get("device_code")
            .and_then(Value::as_str)
            .ok_or_else(|| CopilinkError::Auth("missing device_code".into()))?
            .to_string(),
        user_code: json
            .get("user_code")
            .and_then(Value::as_str)
            .ok_or_else(|| CopilinkError::Auth("missing user_code".into()))?
            .to_string(),
        verification_uri: json
            .get("verification_uri")
            .and_then(Value::as_str)
            .unwrap_or("https://github.com/login/device")
            .to_string(),
        expires_in: json.get("expires_in").and_then(Value::as_u64).unwrap_or(900),
        interval: json.get("interval").and_then(Value::as_u64).unwrap_or(5),
    })
}

/// Parse one token-endpoint poll response.
///
/// # Errors
///
/// Returns [`CopilinkError::Auth`] for any OAuth error other than
/// `authorization_pending` / `slow_down`, or when the response carries
/// neither an error nor an access token.
pub fn parse_token_response(json: &Value) -> Result<PollOutcome> {
    if let Some(token) = json
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
    {
        return Ok(PollOutcome::Granted(token.to_string()));
    }
    match json.get("error").and_then(Value::as_str) {
        Some("authorization_pending" | "slow_down") => Ok(PollOutcome::Pending),
        Some(e) => {
            let msg = match json.get("error_description").and_then(Value::as_str) {
                Some(detail) if !detail.is_empty() => format!("device flow error: {e}: {detail}"),
                _ => format!("device flow error: {e}"),
            };
            Err(CopilinkError::Auth(msg))
        }
        None => Err(CopilinkError::Auth("missing access_token".into())),
    }
}

/// Parse the API-key endpoint response, keeping fields we do not model.
///
/// A missing `expires_at` is replaced by a conservative default lifetime.
///
/// # Errors
///
/// Returns [`CopilinkError::Auth`] if the response has no `token`.
pub fn parse_api_key_response(json: Value) -> Result<ApiKey> {
    if json
        .get("token")
        .and_then(Value::as_str)
        .is_none_or(str::is_empty)
    {
        return Err(CopilinkError::Auth("missing token in Copilot response".into()));
    }
    let mut key: ApiKey = serde_json::from_value(json)?;
    if key.expires_at <= 0 {
        key.expires_at = unix_now() + key.refresh_in.unwrap_or(DEFAULT_KEY_TTL_SECS);
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_device_code() {
        let resp = json!({
            "device_code": "dc",
            "user_code": "XXXX-YYYY",
            "verification_uri": "https://github.com/login/device",
            "expires_in": 900,
            "interval": 5
        });
        let dc = parse_device_code_response(&resp).unwrap();
        assert_eq!(dc.user_code, "XXXX-YYYY");
        assert_eq!(dc.expires_in, 900);
    }

    #[test]
    fn test_parse_device_code_missing_user_code() {
        assert!(parse_device_code_response(&json!({"device_code": "dc"})).is_err());
    }

    #[test]
    fn test_parse_token_granted() {
        let got = parse_token_response(&json!({"access_token": "ghu_abc"})).unwrap();
        assert_eq!(got, PollOutcome::Granted("ghu_abc".into()));
    }

    #[test]
    fn test_parse_token_pending_and_slow_down() {
        for e in ["authorization_pending", "slow_down"] {
            let got = parse_token_response(&json!({"error": e})).unwrap();
            assert_eq!(got, PollOutcome::Pending);
        }
    }

    #[test]
    fn test_parse_token_hard_error() {
        let err = parse_token_response(&json!({
            "error": "access_denied",
            "error_description": "The user cancelled"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("access_denied"));
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn test_parse_token_missing() {
        assert!(parse_token_response(&json!({})).is_err());
    }

    #[test]
    fn test_parse_api_key_keeps_endpoints() {
        let key = parse_api_key_response(json!({
            "token": "tid=1;exp=2",
            "expires_at": 4_102_444_800_i64,
            "refresh_in": 1500,
            "endpoints": {"api": "https://api.business.githubcopilot.com"}
        }))
        .unwrap();
        assert_eq!(key.token, "tid=1;exp=2");
        assert!(key.is_valid());
        assert_eq!(
            key.api_endpoint(),
            Some("https://api.business.githubcopilot.com")
        );
    }

    #[test]
    fn test_parse_api_key_default_expiry() {
        let key = parse_api_key_response(json!({"token": "t"})).unwrap();
        assert!(key.is_valid());
        assert!(key.expires_at <= unix_now() + DEFAULT_KEY_TTL_SECS);
    }

    #[test]
    fn test_parse_api_key_missing_token() {
        let err = parse_api_key_response(json!({"expires_at": 1})).unwrap_err();
        assert!(matches!(err, CopilinkError::Auth(_)));
    }
}
