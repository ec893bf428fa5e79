//! Lifecycle of the Copilot credential pair.
//!
//! Responsibilities:
//! - Serve a valid API key from memory, then from the [`CredentialStore`].
//! - Mint a new key from the access token when the cached one has expired.
//! - Run the device flow when no access token exists, outside the request path.
//! - Bound every network step with a [`RetryPolicy`].
//!
//! Store failures never block a request: a key that cannot be persisted is
//! still cached in memory for the life of the process.
use crate::{
    client::DeviceAuthClient,
    copilot::{DeviceCodeResponse, PollOutcome},
    policy::RetryPolicy,
};
use async_trait::async_trait;
use copilink_config::AuthConfig;
use copilink_types::{
    ApiKey, ApiKeyProvider, CopilinkError, CredentialStore, traits::Result, unix_now,
};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshot of what credentials are currently available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStatus {
    pub has_access_token: bool,
    /// Expiry of the best known API key, valid or not.
    pub api_key_expires_at: Option<i64>,
    pub api_key_valid: bool,
}

pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    client: Arc<dyn DeviceAuthClient>,
    poll: RetryPolicy,
    login: RetryPolicy,
    refresh: RetryPolicy,
    open_browser: bool,
    cached: Mutex<Option<ApiKey>>,
    /// Serialises refreshes inside one process.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl CredentialManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        client: Arc<dyn DeviceAuthClient>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            store,
            client,
            poll: RetryPolicy::new(
                config.poll_max_attempts,
                Duration::from_secs(config.poll_interval_secs),
            ),
            login: RetryPolicy::new(config.login_attempts, Duration::ZERO),
            refresh: RetryPolicy::new(config.refresh_attempts, REFRESH_INTERVAL),
            open_browser: config.open_browser,
            cached: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Return an API key valid right now.
    ///
    /// Checks memory, then the store, and only then refreshes. A refresh may
    /// run the interactive device flow if no access token is stored, so this
    /// belongs at startup or in the CLI, never on the request path.
    ///
    /// # Errors
    ///
    /// Returns [`copilink_types::CopilinkError::Auth`] when the device flow or
    /// the refresh exhausts its attempts.
    pub async fn get_api_key(&self) -> Result<ApiKey> {
        self.obtain(true).await
    }

    /// Like [`Self::get_api_key`], but fails instead of starting the device
    /// flow when no access token is stored.
    ///
    /// # Errors
    ///
    /// Returns [`copilink_types::CopilinkError::Auth`] when nobody is logged in
    /// or the refresh exhausts its attempts.
    pub async fn request_api_key(&self) -> Result<ApiKey> {
        self.obtain(false).await
    }

    async fn obtain(&self, interactive: bool) -> Result<ApiKey> {
        if let Some(key) = self.cached_valid() {
            return Ok(key);
        }
        let _guard = self.refresh_lock.lock().await;
        // Another task may have refreshed while we waited.
        if let Some(key) = self.cached_valid() {
            return Ok(key);
        }
        if let Some(key) = self.load_stored_key().await.filter(ApiKey::is_valid) {
            tracing::debug!(expires_at = key.expires_at, "using persisted API key");
            *self.cache() = Some(key.clone());
            return Ok(key);
        }

        tracing::info!("API key missing or expired, refreshing");
        let access_token = match self.stored_access_token().await {
            Some(token) => token,
            None if interactive => self.provision_access_token().await?,
            None => {
                return Err(CopilinkError::Auth(
                    "not logged in; run `copilink login`".into(),
                ));
            }
        };
        let key = self.mint_api_key(&access_token).await?;
        if let Err(e) = self.store.save_api_key(&key).await {
            tracing::warn!(error = %e, "failed to persist API key, keeping it in memory");
        }
        *self.cache() = Some(key.clone());
        Ok(key)
    }

    /// Drop the current API key so the next [`Self::get_api_key`] mints one.
    ///
    /// # Errors
    ///
    /// Never fails today; store errors are logged.
    pub async fn invalidate_api_key(&self) -> Result<()> {
        *self.cache() = None;
        if let Err(e) = self.store.remove_api_key().await {
            tracing::warn!(error = %e, "failed to remove persisted API key");
        }
        Ok(())
    }

    /// Run the device flow unconditionally and persist the new access token.
    ///
    /// Any previously minted API key is discarded.
    ///
    /// # Errors
    ///
    /// Returns an auth error when all login attempts fail, or a storage error
    /// when the token cannot be written.
    pub async fn login(&self) -> Result<()> {
        let token = self.authorize().await?;
        self.store.save_access_token(&token).await?;
        self.invalidate_api_key().await
    }

    /// Forget both credentials.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the files cannot be removed.
    pub async fn logout(&self) -> Result<()> {
        *self.cache() = None;
        self.store.clear().await
    }

    /// Report which credentials are present without touching the network.
    pub async fn status(&self) -> CredentialStatus {
        let has_access_token = matches!(self.store.load_access_token().await, Ok(Some(_)));
        let cached = self.cache().clone();
        let key = match cached {
            Some(key) => Some(key),
            None => self.load_stored_key().await,
        };
        let now = unix_now();
        CredentialStatus {
            has_access_token,
            api_key_expires_at: key.as_ref().map(|k| k.expires_at),
            api_key_valid: key.is_some_and(|k| k.is_valid_at(now)),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Option<ApiKey>> {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cached_valid(&self) -> Option<ApiKey> {
        self.cache().as_ref().filter(|k| k.is_valid()).cloned()
    }

    async fn load_stored_key(&self) -> Option<ApiKey> {
        match self.store.load_api_key().await {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, "cannot load API key, treating as missing");
                None
            }
        }
    }

    async fn stored_access_token(&self) -> Option<String> {
        match self.store.load_access_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "cannot load access token, treating as missing");
                None
            }
        }
    }

    /// Run the device flow for a missing access token and persist the result.
    async fn provision_access_token(&self) -> Result<String> {
        tracing::warn!("no access token stored, starting device authorization");
        let token = self.authorize().await?;
        if let Err(e) = self.store.save_access_token(&token).await {
            tracing::warn!(error = %e, "failed to persist access token");
        }
        Ok(token)
    }

    async fn mint_api_key(&self, access_token: &str) -> Result<ApiKey> {
        let client = &self.client;
        self.refresh
            .retry("API key refresh", move |_| client.fetch_api_key(access_token))
            .await
    }

    /// The full device flow, retried as a whole.
    async fn authorize(&self) -> Result<String> {
        self.login
            .retry("device authorization", move |attempt| self.device_flow(attempt))
            .await
    }

    async fn device_flow(&self, attempt: u32) -> Result<String> {
        let code = self.client.request_device_code().await?;
        self.announce(&code, attempt);

        let client = &self.client;
        let device_code = code.device_code.as_str();
        let token = self
            .poll
            .poll("device authorization", move |_| async move {
                match client.poll_access_token(device_code).await? {
                    PollOutcome::Granted(token) => Ok(Some(token)),
                    PollOutcome::Pending => Ok(None),
                }
            })
            .await?;
        tracing::info!(attempt, "device authorization granted");
        Ok(token)
    }

    fn announce(&self, code: &DeviceCodeResponse, attempt: u32) {
        eprintln!(
            "Visit {} and enter code {} to authorize GitHub Copilot",
            code.verification_uri, code.user_code
        );
        tracing::warn!(
            attempt,
            verification_uri = %code.verification_uri,
            user_code = %code.user_code,
            "device authorization required"
        );
        if self.open_browser
            && let Err(e) = open::that(&code.verification_uri)
        {
            tracing::warn!(error = %e, "failed to open browser");
        }
    }
}

#[async_trait]
impl ApiKeyProvider for CredentialManager {
    async fn api_key(&self) -> Result<ApiKey> {
        self.request_api_key().await
    }

    async fn invalidate(&self) -> Result<()> {
        self.invalidate_api_key().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copilink_store::InMemoryCredentialStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted identity provider counting every call.
    #[derive(Default)]
    struct FakeClient {
        device_codes: AtomicU32,
        polls: AtomicU32,
        fetches: AtomicU32,
        /// Polls answered with "pending" before the grant.
        pending_polls: u32,
        /// Every poll returns `access_denied`.
        deny: bool,
        /// Fetches that fail before one succeeds.
        failing_fetches: u32,
    }

    #[async_trait]
    impl DeviceAuthClient for FakeClient {
        async fn request_device_code(&self) -> Result<DeviceCodeResponse> {
            self.device_codes.fetch_add(1, Ordering::SeqCst);
            Ok(DeviceCodeResponse {
                device_code: "dc".into(),
                user_code: "ABCD-1234".into(),
                verification_uri: "https://github.com/login/device".into(),
                expires_in: 900,
                interval: 5,
            })
        }

        async fn poll_access_token(&self, device_code: &str) -> Result<PollOutcome> {
            assert_eq!(device_code, "dc");
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.deny {
                return Err(CopilinkError::Auth("device flow error: access_denied".into()));
            }
            if n > self.pending_polls {
                Ok(PollOutcome::Granted("ghu_granted".into()))
            } else {
                Ok(PollOutcome::Pending)
            }
        }

        async fn fetch_api_key(&self, access_token: &str) -> Result<ApiKey> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failing_fetches {
                return Err(CopilinkError::Auth("Copilot token exchange 500".into()));
            }
            Ok(ApiKey::new(
                format!("key-{n}-for-{access_token}"),
                unix_now() + 1500,
            ))
        }
    }

    /// A store whose writes always fail.
    struct ReadOnlyStore;

    #[async_trait]
    impl CredentialStore for ReadOnlyStore {
        async fn load_access_token(&self) -> Result<Option<String>> {
            Ok(Some("ghu_ro".into()))
        }
        async fn save_access_token(&self, _: &str) -> Result<()> {
            Err(CopilinkError::Storage("read-only".into()))
        }
        async fn load_api_key(&self) -> Result<Option<ApiKey>> {
            Ok(None)
        }
        async fn save_api_key(&self, _: &ApiKey) -> Result<()> {
            Err(CopilinkError::Storage("read-only".into()))
        }
        async fn remove_api_key(&self) -> Result<()> {
            Err(CopilinkError::Storage("read-only".into()))
        }
        async fn clear(&self) -> Result<()> {
            Err(CopilinkError::Storage("read-only".into()))
        }
    }

    fn manager(
        store: Arc<dyn CredentialStore>,
        client: Arc<FakeClient>,
    ) -> CredentialManager {
        CredentialManager::new(store, client, &AuthConfig::default())
    }

    fn seeded_store() -> Arc<InMemoryCredentialStore> {
        Arc::new(InMemoryCredentialStore::with_access_token("ghu_stored"))
    }

    #[tokio::test]
    async fn test_valid_persisted_key_skips_refresh() {
        let store = seeded_store();
        store
            .save_api_key(&ApiKey::new("persisted", unix_now() + 600))
            .await
            .unwrap();
        let client = Arc::new(FakeClient::default());
        let m = manager(store, Arc::clone(&client));
        let key = m.get_api_key().await.unwrap();
        assert_eq!(key.token, "persisted");
        assert_eq!(client.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_persisted_key_is_refreshed() {
        let store = seeded_store();
        let stale: ApiKey =
            serde_json::from_str(&format!(r#"{{"token":"abc","expires_at":{}}}"#, unix_now() - 10))
                .unwrap();
        store.save_api_key(&stale).await.unwrap();
        let client = Arc::new(FakeClient::default());
        let m = manager(Arc::clone(&store) as Arc<dyn CredentialStore>, Arc::clone(&client));

        let key = m.get_api_key().await.unwrap();
        assert_ne!(key.token, "abc");
        assert_eq!(key.token, "key-1-for-ghu_stored");
        assert_eq!(client.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(client.device_codes.load(Ordering::SeqCst), 0);
        let persisted = store.load_api_key().await.unwrap().unwrap();
        assert_eq!(persisted.token, key.token);
    }

    #[tokio::test]
    async fn test_second_call_served_from_memory() {
        let client = Arc::new(FakeClient::default());
        let m = manager(seeded_store(), Arc::clone(&client));
        let a = m.get_api_key().await.unwrap();
        let b = m.get_api_key().await.unwrap();
        assert_eq!(a.token, b.token);
        assert_eq!(client.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_access_token_runs_device_flow() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let client = Arc::new(FakeClient {
            pending_polls: 2,
            ..FakeClient::default()
        });
        let m = manager(Arc::clone(&store) as Arc<dyn CredentialStore>, Arc::clone(&client));

        let key = m.get_api_key().await.unwrap();
        assert_eq!(key.token, "key-1-for-ghu_granted");
        assert_eq!(client.device_codes.load(Ordering::SeqCst), 1);
        assert_eq!(client.polls.load(Ordering::SeqCst), 3);
        assert_eq!(
            store.load_access_token().await.unwrap().as_deref(),
            Some("ghu_granted")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_device_flow_exhausts_login_attempts() {
        let client = Arc::new(FakeClient {
            deny: true,
            ..FakeClient::default()
        });
        let m = manager(Arc::new(InMemoryCredentialStore::new()), Arc::clone(&client));

        let err = m.get_api_key().await.unwrap_err();
        assert!(matches!(err, CopilinkError::Auth(_)));
        // A hard poll error aborts polling; the whole flow is retried.
        assert_eq!(client.device_codes.load(Ordering::SeqCst), 3);
        assert_eq!(client.polls.load(Ordering::SeqCst), 3);
        assert_eq!(client.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_approved_times_out() {
        let client = Arc::new(FakeClient {
            pending_polls: u32::MAX,
            ..FakeClient::default()
        });
        let m = manager(Arc::new(InMemoryCredentialStore::new()), Arc::clone(&client));

        let err = m.get_api_key().await.unwrap_err();
        assert!(matches!(err, CopilinkError::Auth(ref msg) if msg.contains("timed out")));
        assert_eq!(client.device_codes.load(Ordering::SeqCst), 3);
        assert_eq!(client.polls.load(Ordering::SeqCst), 36);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_retried_until_success() {
        let client = Arc::new(FakeClient {
            failing_fetches: 2,
            ..FakeClient::default()
        });
        let m = manager(seeded_store(), Arc::clone(&client));
        let key = m.get_api_key().await.unwrap();
        assert_eq!(key.token, "key-3-for-ghu_stored");
        assert_eq!(client.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_exhaustion_is_auth_error() {
        let client = Arc::new(FakeClient {
            failing_fetches: u32::MAX,
            ..FakeClient::default()
        });
        let m = manager(seeded_store(), Arc::clone(&client));
        let err = m.get_api_key().await.unwrap_err();
        assert!(matches!(err, CopilinkError::Auth(_)));
        assert_eq!(client.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unwritable_store_still_serves_key() {
        let client = Arc::new(FakeClient::default());
        let m = manager(Arc::new(ReadOnlyStore), Arc::clone(&client));
        let a = m.get_api_key().await.unwrap();
        assert_eq!(a.token, "key-1-for-ghu_ro");
        let b = m.get_api_key().await.unwrap();
        assert_eq!(a.token, b.token);
        assert_eq!(client.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_key() {
        let client = Arc::new(FakeClient::default());
        let m = manager(seeded_store(), Arc::clone(&client));
        let first = m.get_api_key().await.unwrap();
        m.invalidate_api_key().await.unwrap();
        let second = m.get_api_key().await.unwrap();
        assert_ne!(first.token, second.token);
        assert_eq!(client.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_replaces_access_token() {
        let store = seeded_store();
        let client = Arc::new(FakeClient::default());
        let m = manager(Arc::clone(&store) as Arc<dyn CredentialStore>, Arc::clone(&client));
        m.login().await.unwrap();
        assert_eq!(
            store.load_access_token().await.unwrap().as_deref(),
            Some("ghu_granted")
        );
        assert_eq!(client.device_codes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_status_and_logout() {
        let client = Arc::new(FakeClient::default());
        let m = manager(seeded_store(), client);

        let before = m.status().await;
        assert!(before.has_access_token);
        assert!(!before.api_key_valid);
        assert_eq!(before.api_key_expires_at, None);

        m.get_api_key().await.unwrap();
        let during = m.status().await;
        assert!(during.api_key_valid);
        assert!(during.api_key_expires_at.is_some());

        m.logout().await.unwrap();
        let after = m.status().await;
        assert!(!after.has_access_token);
        assert!(!after.api_key_valid);
    }

    #[tokio::test]
    async fn test_api_key_provider_impl() {
        let client = Arc::new(FakeClient::default());
        let provider: Arc<dyn ApiKeyProvider> = Arc::new(manager(seeded_store(), client));
        let key = provider.api_key().await.unwrap();
        assert!(key.is_valid());
        provider.invalidate().await.unwrap();
    }

    #[tokio::test]
    async fn test_request_path_never_starts_device_flow() {
        let client = Arc::new(FakeClient::default());
        let m = manager(Arc::new(InMemoryCredentialStore::new()), Arc::clone(&client));
        let provider: &dyn ApiKeyProvider = &m;

        let err = provider.api_key().await.unwrap_err();
        assert!(matches!(err, CopilinkError::Auth(ref msg) if msg.contains("copilink login")));
        let err = m.request_api_key().await.unwrap_err();
        assert!(matches!(err, CopilinkError::Auth(_)));
        assert_eq!(client.device_codes.load(Ordering::SeqCst), 0);
        assert_eq!(client.polls.load(Ordering::SeqCst), 0);
        assert_eq!(client.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_request_path_mints_from_stored_token() {
        let client = Arc::new(FakeClient::default());
        let m = manager(seeded_store(), Arc::clone(&client));
        let key = m.request_api_key().await.unwrap();
        assert_eq!(key.token, "key-1-for-ghu_stored");
        assert_eq!(client.device_codes.load(Ordering::SeqCst), 0);
    }
}
