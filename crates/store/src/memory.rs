//! In-memory credential store backed by a `Mutex`.

use async_trait::async_trait;
use copilink_types::{ApiKey, CredentialStore, traits::Result};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Slots {
    access_token: Option<String>,
    api_key: Option<ApiKey>,
}

/// An in-memory [`CredentialStore`] implementation for testing and ephemeral use.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    slots: Mutex<Slots>,
}

impl InMemoryCredentialStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with an access token.
    #[must_use]
    pub fn with_access_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.slots().access_token = Some(token.into());
        store
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load_access_token(&self) -> Result<Option<String>> {
        Ok(self.slots().access_token.clone())
    }

    async fn save_access_token(&self, token: &str) -> Result<()> {
        self.slots().access_token = Some(token.to_string());
        Ok(())
    }

    async fn load_api_key(&self) -> Result<Option<ApiKey>> {
        Ok(self.slots().api_key.clone())
    }

    async fn save_api_key(&self, key: &ApiKey) -> Result<()> {
        self.slots().api_key = Some(key.clone());
        Ok(())
    }

    async fn remove_api_key(&self) -> Result<()> {
        self.slots().api_key = None;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.slots() = Slots::default();
        Ok(())
    }
}
