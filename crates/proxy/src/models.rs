//! Models listing handler: the upstream catalogue in `OpenAI` list format.

use axum::{Json, extract::State};
use copilink_types::ModelInfo;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::{AppState, error::ApiError};

/// Handles `GET /v1/models` requests.
///
/// # Errors
///
/// Returns [`ApiError`] if the catalogue cannot be fetched.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let models = state.executor.list_models().await?;
    let data: Vec<Value> = models.iter().map(ModelInfo::to_openai).collect();
    Ok(Json(json!({
        "object": "list",
        "data": data,
    })))
}
