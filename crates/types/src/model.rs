//! Chat model metadata as advertised by the upstream catalogue.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One chat model the upstream offers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    /// Display name, falls back to `id`.
    pub name: String,
    pub vendor: Option<String>,
    pub max_context_tokens: Option<u64>,
    pub max_input_tokens: Option<u64>,
    pub max_output_tokens: Option<u64>,
    pub supports_vision: bool,
    pub supports_tool_calls: bool,
    pub supports_parallel_tool_calls: bool,
    pub supports_structured_outputs: bool,
    pub supports_streaming: bool,
}

impl ModelInfo {
    /// Render as an entry of an OpenAI `GET /v1/models` list.
    #[must_use]
    pub fn to_openai(&self) -> Value {
        json!({
            "id": self.id,
            "object": "model",
            "created": 0,
            "owned_by": self.vendor.as_deref().unwrap_or("github-copilot"),
        })
    }
}
