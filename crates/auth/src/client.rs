//! Transport side of the device flow.

use crate::copilot::{self, DeviceCodeResponse, PollOutcome};
use async_trait::async_trait;
use copilink_config::UpstreamConfig;
use copilink_types::{ApiKey, CopilinkError, traits::Result};
use rquest::Client;
use serde_json::Value;

/// The identity-provider calls the credential manager depends on.
#[async_trait]
pub trait DeviceAuthClient: Send + Sync {
    /// Start a device authorization and return the code to show the user.
    async fn request_device_code(&self) -> Result<DeviceCodeResponse>;

    /// Ask once whether the user has approved `device_code`.
    async fn poll_access_token(&self, device_code: &str) -> Result<PollOutcome>;

    /// Mint a fresh API key from the long-lived access token.
    async fn fetch_api_key(&self, access_token: &str) -> Result<ApiKey>;
}

/// [`DeviceAuthClient`] talking to github.com over `rquest`.
#[derive(Clone)]
pub struct GithubAuthClient {
    http: Client,
    editor_version: String,
    editor_plugin_version: String,
    user_agent: String,
}

impl GithubAuthClient {
    /// Build a client that identifies itself with the configured editor headers.
    #[must_use]
    pub fn new(http: Client, upstream: &UpstreamConfig) -> Self {
        Self {
            http,
            editor_version: upstream.editor_version.clone(),
            editor_plugin_version: upstream.editor_plugin_version.clone(),
            user_agent: upstream.user_agent.clone(),
        }
    }

    fn editor_headers(&self, builder: rquest::RequestBuilder) -> rquest::RequestBuilder {
        builder
            .header("accept", "application/json")
            .header("user-agent", &self.user_agent)
            .header("editor-version", &self.editor_version)
            .header("editor-plugin-version", &self.editor_plugin_version)
    }

    async fn json_or_auth_error(resp: rquest::Response, what: &str) -> Result<Value> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CopilinkError::Auth(format!("{what} {status}: {text}")));
        }
        resp.json()
            .await
            .map_err(|e| CopilinkError::Auth(format!("failed to parse {what} response: {e}")))
    }
}

#[async_trait]
impl DeviceAuthClient for GithubAuthClient {
    async fn request_device_code(&self) -> Result<DeviceCodeResponse> {
        let scope_str = copilot::SCOPES.join(" ");
        let params = [
            ("client_id", copilot::CLIENT_ID),
            ("scope", scope_str.as_str()),
        ];
        let resp = self
            .editor_headers(self.http.post(copilot::DEVICE_CODE_URL))
            .form(&params)
            .send()
            .await?;
        let json = Self::json_or_auth_error(resp, "device code").await?;
        copilot::parse_device_code_response(&json)
    }

    async fn poll_access_token(&self, device_code: &str) -> Result<PollOutcome> {
        let params = [
            ("client_id", copilot::CLIENT_ID),
            ("device_code", device_code),
            ("grant_type", copilot::DEVICE_GRANT_TYPE),
        ];
        let resp = self
            .editor_headers(self.http.post(copilot::TOKEN_URL))
            .form(&params)
            .send()
            .await?;
        // GitHub reports pending grants as 200 with an `error` field.
        let json = Self::json_or_auth_error(resp, "access token").await?;
        copilot::parse_token_response(&json)
    }

    async fn fetch_api_key(&self, access_token: &str) -> Result<ApiKey> {
        let resp = self
            .editor_headers(self.http.get(copilot::API_KEY_URL))
            .header("authorization", format!("token {access_token}"))
            .send()
            .await?;
        let json = Self::json_or_auth_error(resp, "Copilot token exchange").await?;
        copilot::parse_api_key_response(json)
    }
}
