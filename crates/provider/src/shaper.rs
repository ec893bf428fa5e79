//! Outbound request shaping for the Copilot chat endpoint.
//!
//! The upstream only accepts streaming requests carrying `intent` and `n`,
//! and rejects conversations with tool history unless at least one tool is
//! declared. [`shape`] applies those rules; applying it twice is a no-op.

use copilink_config::UpstreamConfig;
use copilink_types::ChatRequest;
use serde_json::{Value, json};

/// Provider prefixes a gateway may put in front of the model id.
const PROVIDER_PREFIXES: &[&str] = &["github_copilot/", "github-copilot/", "copilot/"];

/// Name of the inert tool declared when the conversation needs one.
pub const PLACEHOLDER_TOOL_NAME: &str = "_noop";

/// A request ready to send upstream, plus what the caller originally wanted.
#[derive(Debug, Clone)]
pub struct ShapedRequest {
    pub body: Value,
    /// Upstream model id, prefix stripped.
    pub model: String,
    /// `false` if the stream must be collapsed before answering the caller.
    pub caller_wants_stream: bool,
    /// `x-initiator` value: `agent` once the assistant or a tool has spoken.
    pub initiator: &'static str,
}

/// Shape `request` for the upstream.
#[must_use]
pub fn shape(request: ChatRequest, upstream: &UpstreamConfig) -> ShapedRequest {
    let caller_wants_stream = request.stream;
    let model = strip_provider_prefix(&request.model).to_string();
    let needs_placeholder =
        upstream.placeholder_tool && !request.has_tools() && request.has_tool_history();
    let initiator = initiator(&request.messages);

    let mut body = request.into_body();
    body["model"] = Value::String(model.clone());
    body["stream"] = Value::Bool(true);
    body["intent"] = Value::Bool(true);
    body["n"] = json!(1);
    if needs_placeholder {
        tracing::debug!(model = %model, "adding placeholder tool for tool history");
        body["tools"] = json!([placeholder_tool()]);
    }

    ShapedRequest {
        body,
        model,
        caller_wants_stream,
        initiator,
    }
}

/// Strip one known provider prefix from `model`.
#[must_use]
pub fn strip_provider_prefix(model: &str) -> &str {
    PROVIDER_PREFIXES
        .iter()
        .find_map(|p| model.strip_prefix(p))
        .unwrap_or(model)
}

fn placeholder_tool() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": PLACEHOLDER_TOOL_NAME,
            "description": "Placeholder. Do not call.",
            "parameters": {"type": "object", "properties": {}}
        }
    })
}

fn initiator(messages: &[Value]) -> &'static str {
    let is_agent = messages.iter().any(|m| {
        matches!(
            m.get("role").and_then(Value::as_str),
            Some("assistant" | "tool")
        )
    });
    if is_agent { "agent" } else { "user" }
}
