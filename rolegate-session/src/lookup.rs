//! Role lookups
//!
//! `RoleLookup` implementations the resolver can be wired with.

use async_trait::async_trait;
use rolegate_core::{RoleLookup, RolegateResult, TokenStore};
use std::sync::Arc;

/// Reads the role name from the token store's current session
#[derive(Clone)]
pub struct SessionRoleLookup {
    store: Arc<dyn TokenStore>,
}

impl SessionRoleLookup {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RoleLookup for SessionRoleLookup {
    async fn current_role(&self) -> RolegateResult<Option<String>> {
        Ok(self
            .store
            .get_session()
            .await?
            .and_then(|session| session.user.role))
    }
}

/// Always answers with the same role name
#[derive(Debug, Clone, Default)]
pub struct StaticRoleLookup {
    role: Option<String>,
}

impl StaticRoleLookup {
    pub fn new(role: Option<String>) -> Self {
        Self { role }
    }

    pub fn role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
        }
    }
}

#[async_trait]
impl RoleLookup for StaticRoleLookup {
    async fn current_role(&self) -> RolegateResult<Option<String>> {
        Ok(self.role.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTokenStore;
    use chrono::Duration;
    use rolegate_core::{Session, SessionUser};

    #[tokio::test]
    async fn session_lookup_follows_store() {
        let store = MemoryTokenStore::new(Duration::minutes(5));
        let lookup = SessionRoleLookup::new(Arc::new(store.clone()));
        assert_eq!(lookup.current_role().await.unwrap(), None);

        store
            .save_session(Session::new("t", SessionUser::new(1, "a").with_role("admin")))
            .await;
        assert_eq!(
            lookup.current_role().await.unwrap().as_deref(),
            Some("admin")
        );
    }

    #[test]
    fn static_lookup_returns_fixed_role() {
        let role = tokio_test::assert_ok!(tokio_test::block_on(
            StaticRoleLookup::role("user").current_role()
        ));
        assert_eq!(role, Some("user".to_string()));

        let none = tokio_test::assert_ok!(tokio_test::block_on(
            StaticRoleLookup::default().current_role()
        ));
        assert_eq!(none, None);
    }
}
