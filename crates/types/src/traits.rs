//! Async traits shared across all copilink crates.
//!
//! Every cross-crate abstraction is defined here so that higher layers depend
//! only on `copilink-types`, not on each other.

use crate::{ApiKey, ChatRequest, ModelInfo, StreamChunk};
use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use serde_json::Value;
use std::pin::Pin;

pub use crate::error::Result;

/// A pinned, sendable stream of raw SSE byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A pinned, sendable stream of normalized chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Durable storage for the long-lived access token and the derived API key.
///
/// Loads never fail on a missing or unreadable entry; they return `Ok(None)`
/// so callers treat it as a cache miss.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the OAuth access token, if one was persisted.
    async fn load_access_token(&self) -> Result<Option<String>>;
    /// Persist the OAuth access token, replacing any previous one.
    async fn save_access_token(&self, token: &str) -> Result<()>;
    /// Load the last minted API key, if present and well-formed.
    async fn load_api_key(&self) -> Result<Option<ApiKey>>;
    /// Persist a freshly minted API key.
    async fn save_api_key(&self, key: &ApiKey) -> Result<()>;
    /// Forget the API key only.
    async fn remove_api_key(&self) -> Result<()>;
    /// Forget both the access token and the API key.
    async fn clear(&self) -> Result<()>;
}

/// Supplies a currently valid upstream bearer key.
#[async_trait]
pub trait ApiKeyProvider: Send + Sync {
    /// Return a key valid at the time of the call, refreshing if needed.
    async fn api_key(&self) -> Result<ApiKey>;
    /// Discard the current key so the next call mints a new one.
    async fn invalidate(&self) -> Result<()>;
}

/// The response produced by a [`ProviderExecutor`].
pub enum ProviderResponse {
    /// The stream collapsed into one `chat.completion` object.
    Complete(Value),
    /// Normalized chunks, in upstream arrival order.
    Stream(ChunkStream),
}

/// Executes chat-completion requests against the upstream.
#[async_trait]
pub trait ProviderExecutor: Send + Sync {
    /// Send a chat-completion request and return the response.
    async fn chat_completion(&self, request: ChatRequest) -> Result<ProviderResponse>;
    /// List the chat models the upstream currently offers.
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
}
