//! Copilot upstream client and stream normalization.
//!
//! [`CopilotClient`] implements [`ProviderExecutor`](copilink_types::ProviderExecutor)
//! on top of the request [`shaper`], the SSE decoder in [`sse`] and the
//! tool-call [`normalizer`]. [`openai`] renders the canonical chunks back
//! into OpenAI payloads.

pub mod classify;
pub mod copilot;
pub mod http_util;
pub mod models;
pub mod normalizer;
pub mod openai;
pub mod shaper;
pub mod sse;

pub use classify::{classify, classify_stream_error};
pub use copilot::CopilotClient;
pub use http_util::ProviderHttp;
pub use models::parse_catalogue;
pub use normalizer::ToolCallNormalizer;
pub use openai::{ChunkRenderer, collect_completion, error_event, render_sse};
pub use shaper::{ShapedRequest, shape, strip_provider_prefix};
pub use sse::normalize_stream;
