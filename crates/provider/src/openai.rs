//! Renders canonical chunks back into OpenAI chat-completion payloads.
//!
//! Streaming callers get `chat.completion.chunk` SSE events; everyone else
//! gets the stream collapsed into a single `chat.completion` object.

use crate::normalizer::DONE_SENTINEL;
use bytes::Bytes;
use copilink_types::{
    ByteStream, ChunkStream, CopilinkError, StreamChunk, TOOL_CALLS_FINISH_REASON, ToolCall,
    traits::Result, unix_now,
};
use futures_util::{StreamExt as _, stream};
use serde_json::{Value, json};

fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

/// Turns canonical chunks into `chat.completion.chunk` objects sharing one
/// id and creation time.
pub struct ChunkRenderer {
    id: String,
    model: String,
    created: i64,
    role_sent: bool,
}

impl ChunkRenderer {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: completion_id(),
            model: model.into(),
            created: unix_now(),
            role_sent: false,
        }
    }

    /// Render one chunk, or `None` if it carries nothing the caller can see.
    ///
    /// Partial tool calls are not rendered; each call goes out once, whole,
    /// on the chunk that completed it.
    pub fn render(&mut self, chunk: &StreamChunk) -> Option<Value> {
        let mut delta = serde_json::Map::new();
        if !chunk.text.is_empty() {
            delta.insert("content".into(), Value::String(chunk.text.clone()));
        }
        if !chunk.completed_tool_calls.is_empty() {
            let calls = chunk
                .completed_tool_calls
                .iter()
                .map(ToolCall::to_openai)
                .collect();
            delta.insert("tool_calls".into(), Value::Array(calls));
        }
        let finish_reason = chunk
            .finish_reason
            .as_deref()
            .filter(|_| chunk.is_finished);
        if delta.is_empty() && finish_reason.is_none() && chunk.usage.is_none() {
            return None;
        }
        if !self.role_sent {
            delta.insert("role".into(), Value::String("assistant".into()));
            self.role_sent = true;
        }

        let mut out = json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish_reason,
            }],
        });
        if let Some(usage) = &chunk.usage {
            out["usage"] = usage.clone();
        }
        Some(out)
    }
}

/// OpenAI-style error event body for a failure in the middle of a stream.
#[must_use]
pub fn error_event(err: &CopilinkError) -> Value {
    json!({
        "error": {
            "message": err.to_string(),
            "type": err.category().as_str(),
            "code": err.status_code(),
        }
    })
}

fn sse_data(payload: &str) -> Result<Bytes> {
    Ok(Bytes::from(format!("data: {payload}\n\n")))
}

/// Render `chunks` as an OpenAI SSE body terminated by `data: [DONE]`.
///
/// A stream error is sent as a final `error` event instead of `[DONE]`.
pub fn render_sse(chunks: ChunkStream, model: impl Into<String>) -> ByteStream {
    struct State {
        chunks: ChunkStream,
        renderer: ChunkRenderer,
        done: bool,
    }

    let state = State {
        chunks,
        renderer: ChunkRenderer::new(model),
        done: false,
    };
    Box::pin(stream::unfold(state, |mut s| async move {
        if s.done {
            return None;
        }
        loop {
            match s.chunks.next().await {
                Some(Ok(chunk)) => {
                    if let Some(event) = s.renderer.render(&chunk) {
                        return Some((sse_data(&event.to_string()), s));
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "upstream stream failed");
                    s.done = true;
                    return Some((sse_data(&error_event(&e).to_string()), s));
                }
                None => {
                    s.done = true;
                    return Some((sse_data(DONE_SENTINEL), s));
                }
            }
        }
    }))
}

/// Drain `chunks` into one `chat.completion` object.
///
/// # Errors
///
/// Returns the first error the stream yields.
pub async fn collect_completion(mut chunks: ChunkStream, model: &str) -> Result<Value> {
    let mut text = String::new();
    let mut calls: Vec<ToolCall> = Vec::new();
    let mut finish_reason = None;
    let mut usage = None;

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        text.push_str(&chunk.text);
        calls.extend(chunk.completed_tool_calls);
        if chunk.is_finished && chunk.finish_reason.is_some() {
            finish_reason = chunk.finish_reason;
        }
        if chunk.usage.is_some() {
            usage = chunk.usage;
        }
    }

    let finish_reason = finish_reason.unwrap_or_else(|| {
        if calls.is_empty() {
            "stop".to_string()
        } else {
            TOOL_CALLS_FINISH_REASON.to_string()
        }
    });
    let content = if text.is_empty() && !calls.is_empty() {
        Value::Null
    } else {
        Value::String(text)
    };
    let mut message = json!({"role": "assistant", "content": content});
    if !calls.is_empty() {
        message["tool_calls"] = calls
            .iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "type": "function",
                    "function": {"name": c.name, "arguments": c.arguments},
                })
            })
            .collect();
    }

    let mut out = json!({
        "id": completion_id(),
        "object": "chat.completion",
        "created": unix_now(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": finish_reason,
        }],
    });
    if let Some(usage) = usage {
        out["usage"] = usage;
    }
    Ok(out)
}
