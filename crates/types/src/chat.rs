//! Strongly-typed OpenAI-compatible chat completion request.
//!
//! Common fields are typed (`model`, `stream`, `messages`); everything else
//! (`temperature`, `tools`, `max_tokens`, ...) is carried through untouched in
//! a catch-all map.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// An OpenAI-compatible chat completion request body as received from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model identifier, possibly provider-prefixed (`"github_copilot/gpt-4.1"`).
    pub model: String,
    /// Whether the caller asked for a streaming response.
    #[serde(default)]
    pub stream: bool,
    /// The conversation messages.
    pub messages: Vec<Value>,
    /// All remaining fields not captured above.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl ChatRequest {
    /// Reconstructs the full request body as a `serde_json::Value`.
    #[must_use]
    pub fn into_body(self) -> Value {
        let mut map = serde_json::Map::with_capacity(self.extra.len() + 3);
        for (k, v) in self.extra {
            map.insert(k, v);
        }
        map.insert("model".into(), Value::String(self.model));
        map.insert("stream".into(), Value::Bool(self.stream));
        map.insert("messages".into(), Value::Array(self.messages));
        Value::Object(map)
    }

    /// `true` if the request carries at least one tool definition.
    #[must_use]
    pub fn has_tools(&self) -> bool {
        self.extra
            .get("tools")
            .and_then(Value::as_array)
            .is_some_and(|tools| !tools.is_empty())
    }

    /// `true` if an earlier turn used tools: an assistant message with
    /// `tool_calls`, or a `tool` result message.
    #[must_use]
    pub fn has_tool_history(&self) -> bool {
        self.messages.iter().any(|m| {
            let role = m.get("role").and_then(Value::as_str);
            role == Some("tool")
                || (role == Some("assistant")
                    && m.get("tool_calls")
                        .and_then(Value::as_array)
                        .is_some_and(|calls| !calls.is_empty()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_minimal() {
        let v = json!({
            "model": "gpt-4.1",
            "messages": [{"role": "user", "content": "hi"}]
        });
        let req: ChatRequest = serde_json::from_value(v).unwrap();
        assert_eq!(req.model, "gpt-4.1");
        assert!(!req.stream);
        assert_eq!(req.messages.len(), 1);
        assert!(req.extra.is_empty());
    }

    #[test]
    fn test_extra_fields_preserved() {
        let v = json!({
            "model": "m",
            "messages": [],
            "temperature": 0.7,
            "max_tokens": 1024,
            "tools": [{"type": "function"}]
        });
        let req: ChatRequest = serde_json::from_value(v).unwrap();
        assert_eq!(req.extra.len(), 3);
        assert_eq!(req.extra["temperature"], json!(0.7));
        let body = req.into_body();
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_has_tools() {
        let with: ChatRequest = serde_json::from_value(json!({
            "model": "m", "messages": [], "tools": [{"type": "function"}]
        }))
        .unwrap();
        let empty: ChatRequest = serde_json::from_value(json!({
            "model": "m", "messages": [], "tools": []
        }))
        .unwrap();
        assert!(with.has_tools());
        assert!(!empty.has_tools());
    }

    #[test]
    fn test_has_tool_history() {
        let plain: ChatRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ]
        }))
        .unwrap();
        assert!(!plain.has_tool_history());

        let called: ChatRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [
                {"role": "assistant", "content": null, "tool_calls": [{"id": "c1"}]}
            ]
        }))
        .unwrap();
        assert!(called.has_tool_history());

        let result: ChatRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [{"role": "tool", "tool_call_id": "c1", "content": "42"}]
        }))
        .unwrap();
        assert!(result.has_tool_history());
    }
}
