//! Route guard tests: navigation events and resolver changes drive route decisions

mod common;

use common::{resolver, session, settings, ScriptedStore};
use rolegate_core::{RoleLevel, RolegateConfig};
use rolegate_session::{
    GateView, NavigationBus, RouteDecision, RouteGuard, RouteTable, SessionRoleLookup,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

async fn wait_for_decision(
    view: &mut watch::Receiver<GateView>,
    path: &str,
    decision: RouteDecision,
) {
    let result = tokio::time::timeout(
        Duration::from_secs(1),
        view.wait_for(|current| current.path == path && current.decision == decision),
    )
    .await;
    let matched = matches!(result, Ok(Ok(_)));
    drop(result);
    assert!(
        matched,
        "expected {:?} on {}, got {:?}",
        decision,
        path,
        *view.borrow()
    );
}

#[tokio::test]
async fn test_guard_tracks_navigation_and_session() {
    let store = Arc::new(ScriptedStore::new(Some(session(1, Some("admin")))));
    let resolver = resolver(&store, Arc::new(SessionRoleLookup::new(store.clone())), settings());
    let navigation = NavigationBus::new("/audit");
    let table = RouteTable::new(RolegateConfig::default().routes);

    let guard = RouteGuard::spawn(table, &navigation, &resolver);
    let mut view = guard.subscribe();
    assert_eq!(guard.current().decision, RouteDecision::Pending);

    resolver.initialize().await;
    wait_for_decision(&mut view, "/audit", RouteDecision::Allow).await;

    navigation.navigate("/admin/users");
    wait_for_decision(
        &mut view,
        "/admin/users",
        RouteDecision::Deny {
            required: RoleLevel::SuperAdmin,
            actual: RoleLevel::Admin,
        },
    )
    .await;

    resolver.clear_session().await;
    wait_for_decision(&mut view, "/admin/users", RouteDecision::LoginRequired).await;

    navigation.navigate("/");
    wait_for_decision(&mut view, "/", RouteDecision::Allow).await;
}

#[tokio::test]
async fn test_menu_for_resolved_level() {
    let store = Arc::new(ScriptedStore::new(Some(session(2, Some("user")))));
    let resolver = resolver(&store, Arc::new(SessionRoleLookup::new(store.clone())), settings());
    let table = RouteTable::new(RolegateConfig::default().routes);

    let state = resolver.initialize().await;
    let titles: Vec<String> = table
        .menu(state.role_level())
        .into_iter()
        .map(|item| item.title)
        .collect();

    assert_eq!(titles, vec!["Home", "Profile"]);
}
