//! Resolver running against the file-backed token store

use chrono::Duration as ChronoDuration;
use rolegate_core::{RoleConfig, RoleLevel, Session, SessionSettings, SessionUser, TokenStore};
use rolegate_session::{FileTokenStore, RolePhase, SessionRoleLookup, SessionRoleResolver};
use std::sync::Arc;

fn resolver_for(store: &Arc<FileTokenStore>) -> SessionRoleResolver {
    SessionRoleResolver::new(
        store.clone(),
        Arc::new(SessionRoleLookup::new(store.clone())),
        RoleConfig::default(),
        SessionSettings::default(),
    )
}

#[tokio::test]
async fn test_persisted_session_resolves_role() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTokenStore::new(
        dir.path().join("session.json"),
        ChronoDuration::minutes(30),
    ));
    let session = Session::new("tok-7", SessionUser::new(7, "mira").with_role("admin"));
    store.save_session(&session).await.unwrap();

    let resolver = resolver_for(&store);
    let state = resolver.initialize().await;

    assert_eq!(state.session(), Some(&session));
    assert_eq!(state.role, RolePhase::Resolved(RoleLevel::Admin));

    let renewed = resolver.refresh_session().await.unwrap();
    assert_eq!(renewed.user.id, 7);
    assert_eq!(store.get_session().await.unwrap(), Some(renewed));
}

#[tokio::test]
async fn test_malformed_file_fails_closed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{\"token\": ").unwrap();
    let store = Arc::new(FileTokenStore::new(&path, ChronoDuration::minutes(30)));

    let resolver = resolver_for(&store);
    assert_eq!(resolver.refresh_session().await, None);

    let state = resolver.snapshot();
    assert!(!state.is_session_loading());
    assert_eq!(state.session(), None);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_logout_removes_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let store = Arc::new(FileTokenStore::new(&path, ChronoDuration::minutes(30)));
    store
        .save_session(&Session::new("tok-1", SessionUser::new(1, "ash").with_role("user")))
        .await
        .unwrap();

    let resolver = resolver_for(&store);
    resolver.initialize().await;
    resolver.clear_session().await;

    assert!(!path.exists());
    assert_eq!(resolver.snapshot().session(), None);
    assert_eq!(
        resolver.snapshot().role,
        RolePhase::Resolved(RoleLevel::Uninitialized)
    );
}
