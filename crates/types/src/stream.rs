//! Canonical streaming output units, independent of the upstream wire shape.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Finish reason that terminates a tool-calling turn and triggers a flush.
pub const TOOL_CALLS_FINISH_REASON: &str = "tool_calls";

/// A (possibly partial) reconstructed function call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Per-stream call index assigned by the upstream.
    pub index: u32,
    /// Provider-assigned call identifier; may be absent on early fragments.
    pub id: Option<String>,
    /// Function name; empty until the fragment carrying it arrives.
    pub name: String,
    /// Argument JSON text accumulated so far.
    pub arguments: String,
}

impl ToolCall {
    /// A call without a name is still being assembled.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.name.is_empty()
    }

    /// Render as an OpenAI `tool_calls[]` entry.
    #[must_use]
    pub fn to_openai(&self) -> Value {
        json!({
            "index": self.index,
            "id": self.id,
            "type": "function",
            "function": {
                "name": self.name,
                "arguments": self.arguments,
            }
        })
    }
}

/// One normalized output chunk; exactly one is produced per upstream event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Incremental content delta from the primary choice.
    pub text: String,
    /// First tool call touched by this event, in its accumulated state.
    pub tool_use: Option<ToolCall>,
    /// `true` iff some choice in the event carried a finish reason.
    pub is_finished: bool,
    pub finish_reason: Option<String>,
    /// Token accounting, only on the event that carried it.
    pub usage: Option<Value>,
    /// Upstream choice index the tool data (or, failing that, the text) came from.
    pub index: u32,
    /// Calls finalized by a tool-call flush on this event, arguments repaired.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completed_tool_calls: Vec<ToolCall>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_until_named() {
        let mut call = ToolCall {
            index: 0,
            id: Some("c1".into()),
            ..ToolCall::default()
        };
        assert!(call.is_partial());
        call.name = "calc".into();
        assert!(!call.is_partial());
    }

    #[test]
    fn test_to_openai_shape() {
        let call = ToolCall {
            index: 1,
            id: Some("call_9".into()),
            name: "get_weather".into(),
            arguments: r#"{"city":"Oslo"}"#.into(),
        };
        let v = call.to_openai();
        assert_eq!(v["index"], 1);
        assert_eq!(v["id"], "call_9");
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["name"], "get_weather");
        assert_eq!(v["function"]["arguments"], r#"{"city":"Oslo"}"#);
    }

    #[test]
    fn test_chunk_serialization_skips_empty_completed() {
        let chunk = StreamChunk {
            text: "hi".into(),
            ..StreamChunk::default()
        };
        let v = serde_json::to_value(&chunk).unwrap();
        assert!(v.get("completed_tool_calls").is_none());
        assert_eq!(v["text"], "hi");
    }
}
