//! Per-stream reassembly of tool calls from Copilot chunk events.
//!
//! Depending on the model behind the upstream, a function call arrives
//! either token by token across many events or whole in a single event,
//! and sometimes in the second choice slot rather than the first. A
//! [`ToolCallNormalizer`] folds every event into one [`StreamChunk`] and
//! keeps the partially assembled calls until a `tool_calls` finish reason
//! flushes them.
//!
//! One normalizer belongs to exactly one upstream response; dropping it
//! discards all state.

use crate::classify::classify_stream_error;
use copilink_types::{CopilinkError, StreamChunk, TOOL_CALLS_FINISH_REASON, ToolCall, traits::Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// The data line that terminates an upstream stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One `tool_calls[]` entry, classified once before it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Name and arguments both present: replaces whatever was accumulated.
    Complete(ToolCall),
    /// A piece of a call; empty fields mean "nothing new".
    Incremental(ToolCall),
    /// Unusable entry, skipped with a warning.
    Malformed(String),
}

/// Classify a raw `tool_calls[]` entry.
///
/// `position` is the entry's place in its array, used when the upstream
/// omits `index`.
#[must_use]
pub fn classify_fragment(raw: &Value, position: usize) -> Fragment {
    let Some(obj) = raw.as_object() else {
        return Fragment::Malformed("tool call is not an object".into());
    };
    let index = match obj.get("index") {
        None | Some(Value::Null) => u32::try_from(position).unwrap_or(u32::MAX),
        Some(v) => match v.as_u64().and_then(|i| u32::try_from(i).ok()) {
            Some(i) => i,
            None => return Fragment::Malformed(format!("invalid tool call index {v}")),
        },
    };
    let function = match obj.get("function") {
        None | Some(Value::Null) => None,
        Some(Value::Object(f)) => Some(f),
        Some(_) => return Fragment::Malformed("`function` is not an object".into()),
    };
    let name = match function.and_then(|f| f.get("name")) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Fragment::Malformed("function name is not a string".into()),
    };
    let arguments = match function.and_then(|f| f.get("arguments")) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        // Some models send parsed arguments instead of JSON text.
        Some(v @ (Value::Object(_) | Value::Array(_))) => v.to_string(),
        Some(_) => return Fragment::Malformed("function arguments are not a string".into()),
    };
    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let call = ToolCall {
        index,
        id,
        name,
        arguments,
    };
    if call.name.is_empty() || call.arguments.is_empty() {
        Fragment::Incremental(call)
    } else {
        Fragment::Complete(call)
    }
}

/// Make accumulated argument text parseable.
///
/// Blank text becomes `{}`; valid JSON is returned unchanged; text that
/// parses once wrapped in braces is wrapped; anything else becomes `{}`.
#[must_use]
pub fn repair_arguments(raw: &str) -> String {
    if raw.trim().is_empty() {
        return "{}".to_string();
    }
    if serde_json::from_str::<Value>(raw).is_ok() {
        return raw.to_string();
    }
    let wrapped = format!("{{{raw}}}");
    if serde_json::from_str::<Value>(&wrapped).is_ok() {
        return wrapped;
    }
    tracing::warn!(arguments = raw, "unrepairable tool call arguments, replacing with {{}}");
    "{}".to_string()
}

/// The tool-call accumulator for one streaming response.
#[derive(Debug, Default)]
pub struct ToolCallNormalizer {
    calls: BTreeMap<u32, ToolCall>,
}

impl ToolCallNormalizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulated call for `index`, if any.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&ToolCall> {
        self.calls.get(&index)
    }

    /// `true` if no call is being assembled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Normalize one SSE `data:` payload.
    ///
    /// Returns `Ok(None)` for the `[DONE]` sentinel and for blank data.
    ///
    /// # Errors
    ///
    /// [`CopilinkError::StreamDecode`] if the payload is not JSON or lacks
    /// the chunk envelope; [`CopilinkError::Upstream`] if it is an error event.
    pub fn normalize_data(&mut self, data: &str) -> Result<Option<StreamChunk>> {
        let data = data.trim();
        if data.is_empty() || data == DONE_SENTINEL {
            return Ok(None);
        }
        let event: Value = serde_json::from_str(data)
            .map_err(|e| CopilinkError::StreamDecode(format!("invalid event JSON: {e}")))?;
        self.normalize(&event).map(Some)
    }

    /// Fold one parsed upstream event into a canonical chunk.
    ///
    /// # Errors
    ///
    /// See [`Self::normalize_data`].
    pub fn normalize(&mut self, event: &Value) -> Result<StreamChunk> {
        if !event.is_object() {
            return Err(CopilinkError::StreamDecode("event is not a JSON object".into()));
        }
        if let Some(error) = event.get("error").filter(|e| !e.is_null()) {
            return Err(classify_stream_error(error).into());
        }
        let usage = event.get("usage").filter(|u| !u.is_null()).cloned();
        let choices: &[Value] = match event.get("choices") {
            Some(Value::Array(choices)) => choices.as_slice(),
            None | Some(Value::Null) if usage.is_some() => &[],
            _ => return Err(CopilinkError::StreamDecode("event has no `choices` array".into())),
        };

        let primary = choices.first();
        let text = primary
            .and_then(|c| c.pointer("/delta/content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut index = primary.map_or(0, |c| choice_index(c, 0));
        let mut tool_use = None;
        if let Some((position, fragments)) = tool_call_source(choices) {
            index = choice_index(&choices[position], position);
            tool_use = self.apply_fragments(fragments);
        }

        let finish_reason = choices
            .iter()
            .find_map(|c| {
                c.get("finish_reason")
                    .and_then(Value::as_str)
                    .filter(|r| !r.is_empty())
            })
            .map(str::to_string);
        let completed_tool_calls = if finish_reason.as_deref() == Some(TOOL_CALLS_FINISH_REASON) {
            self.flush()
        } else {
            Vec::new()
        };

        Ok(StreamChunk {
            text,
            tool_use,
            is_finished: finish_reason.is_some(),
            finish_reason,
            usage,
            index,
            completed_tool_calls,
        })
    }

    /// Flush whatever is still accumulated once the stream has ended.
    pub fn finish(&mut self) -> Vec<ToolCall> {
        self.flush()
    }

    /// Apply every fragment of one event; returns the first touched call in
    /// its accumulated state.
    fn apply_fragments(&mut self, fragments: &[Value]) -> Option<ToolCall> {
        let mut first = None;
        for (position, raw) in fragments.iter().enumerate() {
            let index = match classify_fragment(raw, position) {
                Fragment::Complete(call) => {
                    let index = call.index;
                    self.calls.insert(index, call);
                    index
                }
                Fragment::Incremental(fragment) => self.merge(fragment),
                Fragment::Malformed(reason) => {
                    tracing::warn!(%reason, fragment = %raw, "skipping malformed tool call fragment");
                    continue;
                }
            };
            self.check(index);
            if first.is_none() {
                first = Some(index);
            }
        }
        first.and_then(|i| self.calls.get(&i).cloned())
    }

    fn merge(&mut self, fragment: ToolCall) -> u32 {
        let entry = self
            .calls
            .entry(fragment.index)
            .or_insert_with(|| ToolCall {
                index: fragment.index,
                ..ToolCall::default()
            });
        if entry.name.is_empty() && !fragment.name.is_empty() {
            entry.name = fragment.name;
        }
        if entry.id.is_none() {
            entry.id = fragment.id;
        }
        entry.arguments.push_str(&fragment.arguments);
        entry.index
    }

    /// Soft validation; partial calls and mid-stream JSON are expected.
    fn check(&self, index: u32) {
        let Some(call) = self.calls.get(&index) else {
            return;
        };
        if !call.is_partial()
            && !call.arguments.is_empty()
            && serde_json::from_str::<Value>(&call.arguments).is_err()
        {
            tracing::warn!(index, name = %call.name, "tool call arguments not yet valid JSON");
        }
    }

    /// Drain the table, keeping named calls with repaired arguments.
    fn flush(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.calls)
            .into_values()
            .filter_map(|mut call| {
                if call.is_partial() {
                    tracing::warn!(index = call.index, "dropping tool call without a name");
                    return None;
                }
                call.arguments = repair_arguments(&call.arguments);
                Some(call)
            })
            .collect()
    }
}

/// `choices[i].index`, falling back to the slot position.
fn choice_index(choice: &Value, position: usize) -> u32 {
    choice
        .get("index")
        .and_then(Value::as_u64)
        .and_then(|i| u32::try_from(i).ok())
        .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX))
}

/// Primary choice's tool calls, else the second choice's.
fn tool_call_source(choices: &[Value]) -> Option<(usize, &[Value])> {
    choices.iter().take(2).enumerate().find_map(|(position, c)| {
        c.pointer("/delta/tool_calls")
            .and_then(Value::as_array)
            .filter(|calls| !calls.is_empty())
            .map(|calls| (position, calls.as_slice()))
    })
}
