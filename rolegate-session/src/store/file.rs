//! File-backed token store
//!
//! Persists the session as pretty-printed JSON. Writes go through a temporary
//! file and a rename so a crash never leaves half a credential on disk.

use async_trait::async_trait;
use chrono::Duration;
use rolegate_core::{storage_error, RolegateError, RolegateResult, Session, TokenStore};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
    ttl: Duration,
}

impl FileTokenStore {
    pub fn new<P: AsRef<Path>>(path: P, ttl: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a session, replacing any existing one
    pub async fn save_session(&self, session: &Session) -> RolegateResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json_data = serde_json::to_string_pretty(session)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json_data).await?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            storage_error!(
                format!("Failed to replace {}", self.path.display()),
                "file_store",
                e
            )
        })?;

        debug!(
            user_id = session.user.id,
            path = %self.path.display(),
            "Saved session"
        );
        Ok(())
    }

    /// Raw read: `None` when no file exists. Expiry is not checked here.
    async fn read(&self) -> RolegateResult<Option<Session>> {
        let json_data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RolegateError::Io(e)),
        };

        let session: Session = serde_json::from_str(&json_data)?;
        Ok(Some(session))
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get_session(&self) -> RolegateResult<Option<Session>> {
        Ok(self.read().await?.filter(|s| !s.is_expired()))
    }

    async fn refresh_session(&self) -> RolegateResult<Option<Session>> {
        let Some(session) = self.read().await? else {
            return Ok(None);
        };
        if session.is_expired() {
            debug!(path = %self.path.display(), "Stored session expired, refusing to renew");
            return Ok(None);
        }

        let renewed = session.renewed(self.ttl);
        self.save_session(&renewed).await?;
        Ok(Some(renewed))
    }

    async fn clear_session(&self) -> RolegateResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Removed stored session");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error!(
                format!("Failed to remove {}", self.path.display()),
                "file_store",
                e
            )),
        }
    }
}
