//! GitHub Copilot chat client.
//!
//! Requests are shaped for the upstream, sent with the editor identity
//! headers and a short-lived API key, and the streamed answer is normalized.
//! A 401 discards the key and retries once with a freshly minted one.

use crate::{
    http_util::ProviderHttp,
    models::parse_catalogue,
    openai::collect_completion,
    shaper::{ShapedRequest, shape},
    sse::normalize_stream,
};
use async_trait::async_trait;
use copilink_config::UpstreamConfig;
use copilink_types::{
    ApiKey, ApiKeyProvider, ChatRequest, ErrorCategory, ModelInfo,
    traits::{ProviderExecutor, ProviderResponse, Result},
};
use rquest::{Client, RequestBuilder};
use serde_json::Value;
use std::sync::Arc;

const OPENAI_INTENT: &str = "conversation-panel";

/// Executor for the Copilot chat API.
pub struct CopilotClient {
    http: ProviderHttp,
    keys: Arc<dyn ApiKeyProvider>,
    upstream: UpstreamConfig,
}

impl CopilotClient {
    #[must_use]
    pub fn new(http: Client, keys: Arc<dyn ApiKeyProvider>, upstream: UpstreamConfig) -> Self {
        Self {
            http: ProviderHttp::new(http),
            keys,
            upstream,
        }
    }

    /// API base for `key`: the endpoint it advertises, else the configured one.
    fn base_url<'a>(&'a self, key: &'a ApiKey) -> &'a str {
        key.api_endpoint()
            .unwrap_or_else(|| self.upstream.api_base.trim_end_matches('/'))
    }

    fn with_identity(&self, builder: RequestBuilder, key: &ApiKey) -> RequestBuilder {
        builder
            .header("authorization", format!("Bearer {}", key.token))
            .header("user-agent", self.upstream.user_agent.as_str())
            .header("editor-version", self.upstream.editor_version.as_str())
            .header(
                "editor-plugin-version",
                self.upstream.editor_plugin_version.as_str(),
            )
            .header("copilot-integration-id", self.upstream.integration_id.as_str())
    }

    fn chat_request(&self, key: &ApiKey, shaped: &ShapedRequest) -> RequestBuilder {
        let url = format!("{}/chat/completions", self.base_url(key));
        self.with_identity(self.http.client().post(url), key)
            .header("openai-intent", OPENAI_INTENT)
            .header("x-initiator", shaped.initiator)
            .header("content-type", "application/json")
            .json(&shaped.body)
    }

    fn models_request(&self, key: &ApiKey) -> RequestBuilder {
        let url = format!("{}/models", self.base_url(key));
        self.with_identity(self.http.client().get(url), key)
            .header("accept", "application/json")
    }

    /// Send the request built by `build`, retrying once with a fresh key if
    /// the upstream rejects the current one.
    async fn send_authorized(
        &self,
        build: impl Fn(&ApiKey) -> RequestBuilder + Send + Sync,
    ) -> Result<rquest::Response> {
        let key = self.keys.api_key().await?;
        match self.http.send(build(&key)).await {
            Err(e) if e.category() == ErrorCategory::Unauthorized => {
                tracing::warn!("copilot rejected the API key, refreshing");
                self.keys.invalidate().await?;
                let key = self.keys.api_key().await?;
                self.http.send(build(&key)).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl ProviderExecutor for CopilotClient {
    async fn chat_completion(&self, request: ChatRequest) -> Result<ProviderResponse> {
        let shaped = shape(request, &self.upstream);
        tracing::info!(
            model = %shaped.model,
            stream = shaped.caller_wants_stream,
            initiator = shaped.initiator,
            "copilot chat completion"
        );
        let resp = self
            .send_authorized(|key| self.chat_request(key, &shaped))
            .await?;
        let chunks = normalize_stream(ProviderHttp::byte_stream(resp));
        if shaped.caller_wants_stream {
            Ok(ProviderResponse::Stream(chunks))
        } else {
            collect_completion(chunks, &shaped.model)
                .await
                .map(ProviderResponse::Complete)
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let resp = self.send_authorized(|key| self.models_request(key)).await?;
        let body: Value = resp.json().await?;
        let models = parse_catalogue(&body);
        tracing::info!(count = models.len(), "fetched copilot model catalogue");
        Ok(models)
    }
}
