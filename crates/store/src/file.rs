//! File-backed credential store: one plaintext access-token file and one
//! JSON API-key file under a shared directory.

use async_trait::async_trait;
use copilink_types::{ApiKey, CopilinkError, CredentialStore, traits::Result};
use std::{
    ffi::OsStr,
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// A [`CredentialStore`] persisting to two files.
///
/// Unreadable or malformed files load as `None`. Writes go through a
/// temporary file and a rename so readers never observe a torn API key.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
    access_token_path: PathBuf,
    api_key_path: PathBuf,
}

impl FileCredentialStore {
    /// Opens the store, creating `dir` if it does not exist.
    ///
    /// A directory that cannot be created is logged, not fatal: loads will
    /// miss and saves will report [`CopilinkError::Storage`].
    pub async fn open(
        dir: impl Into<PathBuf>,
        access_token_file: &str,
        api_key_file: &str,
    ) -> Self {
        let dir = dir.into();
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot create credential directory");
        }
        Self {
            access_token_path: dir.join(access_token_file),
            api_key_path: dir.join(api_key_file),
            dir,
        }
    }

    /// Directory holding both credential files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_optional(path: &Path) -> Option<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(s) => Some(s),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "credential file not found");
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read credential file");
                None
            }
        }
    }

    async fn write_private(&self, path: &Path, contents: &str) -> Result<()> {
        let storage = |e: std::io::Error| {
            CopilinkError::Storage(format!("failed to write {}: {e}", path.display()))
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(storage)?;
        // Sibling of the target, keyed by the full file name so `token` and
        // `token.json` never share a temp file.
        let mut tmp_name = path.file_name().map(OsStr::to_os_string).unwrap_or_default();
        tmp_name.push(format!(".{}.tmp", std::process::id()));
        let tmp = path.with_file_name(tmp_name);
        tokio::fs::write(&tmp, contents).await.map_err(storage)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(storage)?;
        }
        tokio::fs::rename(&tmp, path).await.map_err(storage)
    }

    async fn remove_file(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CopilinkError::Storage(format!(
                "failed to remove {}: {e}",
                path.display()
            ))),
        }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load_access_token(&self) -> Result<Option<String>> {
        Ok(Self::read_optional(&self.access_token_path)
            .await
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }

    async fn save_access_token(&self, token: &str) -> Result<()> {
        self.write_private(&self.access_token_path, token).await
    }

    async fn load_api_key(&self) -> Result<Option<ApiKey>> {
        let Some(raw) = Self::read_optional(&self.api_key_path).await else {
            return Ok(None);
        };
        match serde_json::from_str::<ApiKey>(&raw) {
            Ok(key) => Ok(Some(key)),
            Err(e) => {
                tracing::warn!(
                    path = %self.api_key_path.display(),
                    error = %e,
                    "malformed API key file, ignoring"
                );
                Ok(None)
            }
        }
    }

    async fn save_api_key(&self, key: &ApiKey) -> Result<()> {
        let json = serde_json::to_string(key)?;
        self.write_private(&self.api_key_path, &json).await
    }

    async fn remove_api_key(&self) -> Result<()> {
        Self::remove_file(&self.api_key_path).await
    }

    async fn clear(&self) -> Result<()> {
        Self::remove_file(&self.access_token_path).await?;
        Self::remove_file(&self.api_key_path).await
    }
}
