//! Core types and traits for the copilink workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! Copilot adapter: the error taxonomy, the API-key credential, the canonical
//! stream chunk, and the async traits that each layer implements.

pub mod chat;
pub mod error;
pub mod model;
pub mod stream;
pub mod token;
pub mod traits;

pub use chat::ChatRequest;
pub use error::{CopilinkError, ErrorCategory, UpstreamError};
pub use model::ModelInfo;
pub use stream::{StreamChunk, TOOL_CALLS_FINISH_REASON, ToolCall};
pub use token::{ApiKey, unix_now};
pub use traits::{
    ApiKeyProvider, ByteStream, ChunkStream, CredentialStore, ProviderExecutor, ProviderResponse,
};
