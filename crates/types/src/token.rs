//! Short-lived Copilot API key and its validity window.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Current Unix time in whole seconds.
#[must_use]
pub fn unix_now() -> i64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// A bearer token minted from the long-lived access token.
///
/// Serialized as the refresh endpoint returns it: `{token, expires_at, ...}`.
/// Fields this crate does not model (`endpoints`, `sku`, ...) survive a
/// load/save round trip through [`ApiKey::extra`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub token: String,
    /// Absolute expiry as Unix seconds. A missing value reads as already expired.
    #[serde(default)]
    pub expires_at: i64,
    /// Seconds after which the upstream suggests refreshing early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_in: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiKey {
    /// Create a key expiring at the given Unix timestamp.
    pub fn new(token: impl Into<String>, expires_at: i64) -> Self {
        Self {
            token: token.into(),
            expires_at,
            refresh_in: None,
            extra: Map::new(),
        }
    }

    /// `true` while `now < expires_at`.
    #[must_use]
    pub fn is_valid_at(&self, now: i64) -> bool {
        !self.token.is_empty() && now < self.expires_at
    }

    /// [`ApiKey::is_valid_at`] evaluated against the system clock.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(unix_now())
    }

    /// Chat API base advertised by the refresh endpoint (`endpoints.api`), if any.
    #[must_use]
    pub fn api_endpoint(&self) -> Option<&str> {
        self.extra
            .get("endpoints")
            .and_then(|e| e.get("api"))
            .and_then(Value::as_str)
            .map(|s| s.trim_end_matches('/'))
            .filter(|s| !s.is_empty())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("refresh_in", &self.refresh_in)
            .finish_non_exhaustive()
    }
}
