//! Copilot model catalogue parsing.

use copilink_types::ModelInfo;
use serde_json::Value;

/// Parse a `GET /models` body (`{"data": [...]}` or a bare array), keeping
/// only picker-enabled chat models.
#[must_use]
pub fn parse_catalogue(body: &Value) -> Vec<ModelInfo> {
    let entries = body
        .get("data")
        .and_then(Value::as_array)
        .or_else(|| body.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();
    entries.iter().filter_map(to_model_info).collect()
}

/// Convert one catalogue entry; `None` for entries that are not selectable
/// chat models.
#[must_use]
pub fn to_model_info(model: &Value) -> Option<ModelInfo> {
    if !model
        .get("model_picker_enabled")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return None;
    }
    let capabilities = model.get("capabilities")?;
    if capabilities.get("type").and_then(Value::as_str) != Some("chat") {
        return None;
    }
    let id = model.get("id").and_then(Value::as_str).filter(|s| !s.is_empty())?;

    let limit = |key: &str| capabilities.pointer(&format!("/limits/{key}")).and_then(Value::as_u64);
    let supports = |key: &str| {
        capabilities
            .pointer(&format!("/supports/{key}"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    };

    let context = limit("max_context_window_tokens");
    Some(ModelInfo {
        id: id.to_string(),
        name: model
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(id)
            .to_string(),
        vendor: model.get("vendor").and_then(Value::as_str).map(str::to_string),
        max_context_tokens: context,
        max_input_tokens: limit("max_prompt_tokens").or_else(|| context.map(|c| c * 3 / 4)),
        max_output_tokens: limit("max_output_tokens").or_else(|| context.map(|c| c / 4)),
        supports_vision: supports("vision"),
        supports_tool_calls: supports("tool_calls"),
        supports_parallel_tool_calls: supports("parallel_tool_calls"),
        supports_structured_outputs: supports("structured_outputs"),
        supports_streaming: supports("streaming"),
    })
}
