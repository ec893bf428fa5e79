//! Chat completions handler: forwards OpenAI-compatible requests to Copilot.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use copilink_provider::{render_sse, strip_provider_prefix};
use copilink_types::{ChatRequest, traits::ProviderResponse};
use futures_util::TryStreamExt as _;
use std::sync::Arc;

use crate::{AppState, error::ApiError};

/// Handles `POST /v1/chat/completions` requests.
///
/// Returns either a complete JSON response or an SSE stream, following the
/// caller's `stream` flag.
///
/// # Errors
///
/// Returns [`ApiError`] if the credential cannot be obtained or the upstream
/// call fails before the first byte is sent.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let model = strip_provider_prefix(&request.model).to_string();
    tracing::info!(
        model = %model,
        stream = request.stream,
        messages = request.messages.len(),
        "chat completion request"
    );

    match state.executor.chat_completion(request).await? {
        ProviderResponse::Complete(json) => {
            tracing::debug!(model = %model, "chat completion complete");
            Ok(Json(json).into_response())
        }
        ProviderResponse::Stream(chunks) => {
            tracing::debug!(model = %model, "streaming chat completion");
            let body = render_sse(chunks, model).map_err(|e| std::io::Error::other(e.to_string()));
            Ok((
                [
                    (header::CONTENT_TYPE, "text/event-stream"),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                [("x-accel-buffering", "no")],
                Body::from_stream(body),
            )
                .into_response())
        }
    }
}
