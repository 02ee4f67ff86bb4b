//! In-process token store

use async_trait::async_trait;
use chrono::Duration;
use rolegate_core::{RolegateResult, Session, TokenStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Keeps the session in memory; cloning shares the same slot
#[derive(Debug, Clone)]
pub struct MemoryTokenStore {
    slot: Arc<RwLock<Option<Session>>>,
    ttl: Duration,
}

impl MemoryTokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
            ttl,
        }
    }

    /// Store pre-loaded with a session, as after a login
    pub fn with_session(session: Session, ttl: Duration) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Some(session))),
            ttl,
        }
    }

    pub async fn save_session(&self, session: Session) {
        debug!(user_id = session.user.id, "Saving session in memory");
        *self.slot.write().await = Some(session);
    }

    pub async fn is_empty(&self) -> bool {
        self.slot.read().await.is_none()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get_session(&self) -> RolegateResult<Option<Session>> {
        let slot = self.slot.read().await;
        Ok(slot.as_ref().filter(|s| !s.is_expired()).cloned())
    }

    async fn refresh_session(&self) -> RolegateResult<Option<Session>> {
        let mut slot = self.slot.write().await;
        let renewed = match slot.as_ref() {
            Some(session) if !session.is_expired() => session.renewed(self.ttl),
            Some(_) => {
                debug!("Stored session expired, refusing to renew");
                return Ok(None);
            }
            None => return Ok(None),
        };
        *slot = Some(renewed.clone());
        Ok(Some(renewed))
    }

    async fn clear_session(&self) -> RolegateResult<()> {
        *self.slot.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolegate_core::SessionUser;

    #[tokio::test]
    async fn refresh_extends_expiry() {
        let session = Session::new("t", SessionUser::new(1, "a")).with_ttl(Duration::minutes(1));
        let store = MemoryTokenStore::with_session(session.clone(), Duration::minutes(30));

        let renewed = store.refresh_session().await.unwrap().unwrap();
        assert_eq!(renewed.token, "t");
        assert!(renewed.expires_at > session.expires_at);
        assert_eq!(store.get_session().await.unwrap(), Some(renewed));
    }

    #[tokio::test]
    async fn expired_session_is_absent() {
        let mut session = Session::new("t", SessionUser::new(1, "a"));
        session.expires_at = Some(session.issued_at - Duration::seconds(1));
        let store = MemoryTokenStore::with_session(session, Duration::minutes(30));

        assert_eq!(store.get_session().await.unwrap(), None);
        assert_eq!(store.refresh_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let store = MemoryTokenStore::new(Duration::minutes(5));
        store
            .save_session(Session::new("t", SessionUser::new(1, "a")))
            .await;
        store.clear_session().await.unwrap();
        store.clear_session().await.unwrap();
        assert!(store.is_empty().await);
    }
}
