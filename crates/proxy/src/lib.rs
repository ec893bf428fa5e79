//! HTTP proxy layer: axum router, route handlers, and error mapping.
//!
//! Exposes an OpenAI-compatible `/v1/chat/completions` endpoint and a
//! `/v1/models` listing, both served by a single [`ProviderExecutor`].

mod chat;
mod error;
mod models;

pub use error::ApiError;

use axum::{
    Json, Router,
    routing::{get, post},
};
use copilink_types::ProviderExecutor;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state passed to all route handlers.
pub struct AppState {
    /// Upstream executor for chat completions and the model catalogue.
    pub executor: Arc<dyn ProviderExecutor>,
}

impl AppState {
    /// Creates a new shared application state wrapped in an `Arc`.
    pub fn new(executor: Arc<dyn ProviderExecutor>) -> Arc<Self> {
        Arc::new(Self { executor })
    }
}

/// Build the full axum router.
///
/// Routes:
/// - POST /v1/chat/completions
/// - GET  /v1/models
/// - GET  /health
pub fn make_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/models", get(models::list_models))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use copilink_types::{
        ChatRequest, CopilinkError, ErrorCategory, ModelInfo, StreamChunk, UpstreamError,
        traits::{ProviderResponse, Result},
    };
    use futures_util::stream;
    use http_body_util::BodyExt as _;
    use tower::ServiceExt as _;

    /// Answers with canned text, or fails with `fail_status` when set.
    #[derive(Default)]
    struct FakeExecutor {
        fail_status: Option<u16>,
    }

    #[async_trait]
    impl ProviderExecutor for FakeExecutor {
        async fn chat_completion(&self, request: ChatRequest) -> Result<ProviderResponse> {
            if let Some(status) = self.fail_status {
                return Err(UpstreamError {
                    status_code: status,
                    message: "model not supported".into(),
                    category: ErrorCategory::from_status(status),
                    raw_body: None,
                    retry_after: None,
                    request_id: None,
                }
                .into());
            }
            if request.stream {
                let chunks: Vec<Result<StreamChunk>> = vec![
                    Ok(StreamChunk {
                        text: "Hi".into(),
                        ..StreamChunk::default()
                    }),
                    Ok(StreamChunk {
                        is_finished: true,
                        finish_reason: Some("stop".into()),
                        ..StreamChunk::default()
                    }),
                ];
                Ok(ProviderResponse::Stream(Box::pin(stream::iter(chunks))))
            } else {
                Ok(ProviderResponse::Complete(json!({
                    "object": "chat.completion",
                    "model": request.model,
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi"}}]
                })))
            }
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>> {
            if self.fail_status.is_some() {
                return Err(CopilinkError::Auth("no access token".into()));
            }
            Ok(vec![ModelInfo {
                id: "gpt-4.1".into(),
                name: "GPT-4.1".into(),
                ..ModelInfo::default()
            }])
        }
    }

    fn app(executor: FakeExecutor) -> Router {
        make_router(AppState::new(Arc::new(executor)))
    }

    fn chat_request(stream: bool) -> Request<Body> {
        let body = json!({
            "model": "github_copilot/gpt-4.1",
            "stream": stream,
            "messages": [{"role": "user", "content": "hi"}]
        });
        Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
        resp.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn test_health() {
        let resp = app(FakeExecutor::default())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_list_models() {
        let resp = app(FakeExecutor::default())
            .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json["object"], "list");
        assert_eq!(json["data"][0]["id"], "gpt-4.1");
        assert_eq!(json["data"][0]["owned_by"], "github-copilot");
    }

    #[tokio::test]
    async fn test_list_models_auth_failure() {
        let resp = app(FakeExecutor {
            fail_status: Some(500),
        })
        .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_chat_complete_json() {
        let resp = app(FakeExecutor::default())
            .oneshot(chat_request(false))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json["choices"][0]["message"]["content"], "Hi");
    }

    #[tokio::test]
    async fn test_chat_stream_sse() {
        let resp = app(FakeExecutor::default())
            .oneshot(chat_request(true))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/event-stream");
        assert_eq!(resp.headers()["x-accel-buffering"], "no");
        let body = String::from_utf8(body_bytes(resp).await).unwrap();
        assert!(body.contains("\"content\":\"Hi\""));
        assert!(body.contains("\"model\":\"gpt-4.1\""));
        assert!(body.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn test_chat_upstream_error_status() {
        let resp = app(FakeExecutor {
            fail_status: Some(404),
        })
        .oneshot(chat_request(false))
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json["error"]["code"], "not_found_error");
        assert!(
            json["error"]["message"]
                .as_str()
                .unwrap()
                .contains("model not supported")
        );
    }
}
