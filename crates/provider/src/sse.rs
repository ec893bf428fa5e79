//! SSE decoding of the upstream byte stream into canonical chunks.

use crate::normalizer::{DONE_SENTINEL, ToolCallNormalizer};
use copilink_types::{ByteStream, ChunkStream, CopilinkError, StreamChunk};
use eventsource_stream::{EventStream, EventStreamError, Eventsource as _};
use futures_util::{StreamExt as _, stream::try_unfold};
use std::pin::Pin;

/// Decode `bytes` as SSE and run every event through a fresh
/// [`ToolCallNormalizer`].
///
/// Calls still accumulated when the stream ends are flushed in one trailing
/// chunk. The first error terminates the stream.
pub fn normalize_stream(bytes: ByteStream) -> ChunkStream {
    struct State {
        events: Pin<Box<EventStream<ByteStream>>>,
        normalizer: ToolCallNormalizer,
        done: bool,
    }

    Box::pin(try_unfold(
        State {
            events: Box::pin(bytes.eventsource()),
            normalizer: ToolCallNormalizer::new(),
            done: false,
        },
        |mut s| async move {
            if s.done {
                return Ok::<_, CopilinkError>(None);
            }
            while let Some(event) = s.events.next().await {
                let event = event.map_err(decode_error)?;
                if event.data.trim() == DONE_SENTINEL {
                    break;
                }
                if let Some(chunk) = s.normalizer.normalize_data(&event.data)? {
                    return Ok(Some((chunk, s)));
                }
            }
            s.done = true;
            let leftovers = s.normalizer.finish();
            if leftovers.is_empty() {
                return Ok(None);
            }
            tracing::debug!(count = leftovers.len(), "flushing tool calls at end of stream");
            let chunk = StreamChunk {
                completed_tool_calls: leftovers,
                ..StreamChunk::default()
            };
            Ok(Some((chunk, s)))
        },
    ))
}

fn decode_error(e: EventStreamError<CopilinkError>) -> CopilinkError {
    match e {
        EventStreamError::Transport(e) => e,
        other => CopilinkError::StreamDecode(other.to_string()),
    }
}
