//! Route gating and menu derivation
//!
//! A `RouteTable` decides whether the current resolver state may enter a path
//! and which menu entries a role level can see. `RouteGuard` keeps a decision
//! for the current path up to date as navigation and resolver state change.

use crate::navigation::{normalize_path, NavigationBus};
use crate::resolver::SessionRoleResolver;
use crate::state::ResolverState;
use rolegate_core::{RoleLevel, RouteRule};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Outcome of checking a path against the route table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RouteDecision {
    /// Session or role still loading; render a placeholder
    Pending,
    Allow,
    /// Known to be logged out on a route that needs a role
    LoginRequired,
    Deny {
        required: RoleLevel,
        actual: RoleLevel,
    },
}

impl RouteDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RouteDecision::Allow)
    }
}

/// Visible menu entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub path: String,
    pub title: String,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    pub fn with_rule(mut self, rule: RouteRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Most specific rule covering `path`
    pub fn rule_for(&self, path: &str) -> Option<&RouteRule> {
        let path = normalize_path(path);
        self.rules
            .iter()
            .filter(|rule| rule.matches(&path))
            .max_by_key(|rule| rule.path.trim_end_matches('/').len())
    }

    /// Decision for a known role level, ignoring loading and session state
    pub fn decide_level(&self, path: &str, level: RoleLevel) -> RouteDecision {
        match self.rule_for(path) {
            Some(rule) if level < rule.min_level => RouteDecision::Deny {
                required: rule.min_level,
                actual: level,
            },
            _ => RouteDecision::Allow,
        }
    }

    pub fn decide(&self, path: &str, state: &ResolverState) -> RouteDecision {
        let Some(rule) = self.rule_for(path) else {
            return RouteDecision::Allow;
        };
        if rule.min_level == RoleLevel::Uninitialized {
            return RouteDecision::Allow;
        }
        if state.is_session_loading() {
            return RouteDecision::Pending;
        }
        if state.session().is_none() {
            return RouteDecision::LoginRequired;
        }
        if state.is_role_loading() {
            return RouteDecision::Pending;
        }
        self.decide_level(path, state.role_level())
    }

    /// Menu entries visible at `level`, in declaration order
    pub fn menu(&self, level: RoleLevel) -> Vec<MenuItem> {
        self.rules
            .iter()
            .filter(|rule| rule.show_in_menu && level >= rule.min_level)
            .map(|rule| MenuItem {
                path: rule.path.clone(),
                title: rule.title.clone(),
            })
            .collect()
    }
}

/// Decision for the path currently shown
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateView {
    pub path: String,
    pub decision: RouteDecision,
}

/// Re-evaluates the route table whenever the path or the resolver state changes
pub struct RouteGuard {
    view: watch::Receiver<GateView>,
    task: JoinHandle<()>,
}

impl RouteGuard {
    /// Start watching. Must be called inside a tokio runtime.
    pub fn spawn(
        table: RouteTable,
        navigation: &NavigationBus,
        resolver: &SessionRoleResolver,
    ) -> Self {
        let table = Arc::new(table);
        let mut path_rx = navigation.subscribe();
        let mut state_rx = resolver.subscribe();

        let initial = evaluate(&table, &path_rx.borrow_and_update(), &state_rx.borrow_and_update());
        let (view_tx, view) = watch::channel(initial);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = path_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let next = evaluate(&table, &path_rx.borrow_and_update(), &state_rx.borrow_and_update());
                view_tx.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    debug!(path = %next.path, decision = ?next.decision, "Route decision changed");
                    *current = next;
                    true
                });

                if view_tx.is_closed() {
                    break;
                }
            }
        });

        Self { view, task }
    }

    pub fn current(&self) -> GateView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GateView> {
        self.view.clone()
    }
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn evaluate(table: &RouteTable, path: &str, state: &ResolverState) -> GateView {
    GateView {
        path: path.to_string(),
        decision: table.decide(path, state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{RolePhase, SessionPhase};
    use rolegate_core::{Session, SessionUser};

    fn table() -> RouteTable {
        RouteTable::default()
            .with_rule(RouteRule::new("/", "Home", RoleLevel::Uninitialized))
            .with_rule(RouteRule::new("/profile", "Profile", RoleLevel::Standard))
            .with_rule(RouteRule::new("/audit", "Audit", RoleLevel::Admin))
            .with_rule(RouteRule::new("/audit/export", "Export", RoleLevel::SuperAdmin).hidden())
    }

    fn state(session: bool, role: RolePhase) -> ResolverState {
        ResolverState {
            session: if session {
                SessionPhase::Resolved(Session::new("t", SessionUser::new(1, "a")))
            } else {
                SessionPhase::Absent
            },
            role,
            ..Default::default()
        }
    }

    #[test]
    fn most_specific_rule_wins() {
        let table = table();
        assert_eq!(table.rule_for("/audit/export/csv").unwrap().title, "Export");
        assert_eq!(table.rule_for("/audit/logs").unwrap().title, "Audit");
        assert_eq!(table.rule_for("/unknown").unwrap().title, "Home");
    }

    #[test]
    fn decide_covers_every_outcome() {
        let table = table();

        assert_eq!(table.decide("/", &ResolverState::default()), RouteDecision::Allow);
        assert_eq!(
            table.decide("/audit", &ResolverState::default()),
            RouteDecision::Pending
        );
        assert_eq!(
            table.decide("/audit", &state(false, RolePhase::Resolved(RoleLevel::Uninitialized))),
            RouteDecision::LoginRequired
        );
        assert_eq!(
            table.decide("/audit", &state(true, RolePhase::Loading)),
            RouteDecision::Pending
        );
        assert_eq!(
            table.decide("/audit", &state(true, RolePhase::Resolved(RoleLevel::Standard))),
            RouteDecision::Deny {
                required: RoleLevel::Admin,
                actual: RoleLevel::Standard
            }
        );
        assert_eq!(
            table.decide("/audit", &state(true, RolePhase::Resolved(RoleLevel::Admin))),
            RouteDecision::Allow
        );
        assert_eq!(
            table.decide("/profile", &state(true, RolePhase::Unrecognized("x".into()))),
            RouteDecision::Deny {
                required: RoleLevel::Standard,
                actual: RoleLevel::Uninitialized
            }
        );
    }

    #[test]
    fn menu_follows_level() {
        let table = table();
        let titles = |level| {
            table
                .menu(level)
                .into_iter()
                .map(|item| item.title)
                .collect::<Vec<_>>()
        };

        assert_eq!(titles(RoleLevel::Uninitialized), vec!["Home"]);
        assert_eq!(titles(RoleLevel::Standard), vec!["Home", "Profile"]);
        assert_eq!(titles(RoleLevel::SuperAdmin), vec!["Home", "Profile", "Audit"]);
    }
}
