//! Shared test collaborators for resolver tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use rolegate_core::{
    ErrorContext, RetryConfig, RoleConfig, RoleLookup, RolegateError, RolegateResult, Session,
    SessionSettings, SessionUser, TokenStore,
};
use rolegate_session::SessionRoleResolver;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the scripted store answers to `refresh_session`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Renew whatever is stored (or report absence if nothing is)
    Renew,
    /// Explicit "no session"
    Absent,
    /// Unexpected failure
    Fail,
}

/// Token store driven by the test
pub struct ScriptedStore {
    stored: Mutex<Option<Session>>,
    outcome: Mutex<RefreshOutcome>,
    pub get_delay: Duration,
    pub refresh_delay: Duration,
    pub get_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub clear_calls: AtomicUsize,
}

impl ScriptedStore {
    pub fn new(stored: Option<Session>) -> Self {
        Self {
            stored: Mutex::new(stored),
            outcome: Mutex::new(RefreshOutcome::Renew),
            get_delay: Duration::ZERO,
            refresh_delay: Duration::ZERO,
            get_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            clear_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_get_delay(mut self, delay: Duration) -> Self {
        self.get_delay = delay;
        self
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn set_outcome(&self, outcome: RefreshOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn set_stored(&self, session: Option<Session>) {
        *self.stored.lock().unwrap() = session;
    }

    pub fn stored(&self) -> Option<Session> {
        self.stored.lock().unwrap().clone()
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn clear_count(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for ScriptedStore {
    async fn get_session(&self) -> RolegateResult<Option<Session>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if !self.get_delay.is_zero() {
            tokio::time::sleep(self.get_delay).await;
        }
        Ok(self.stored())
    }

    async fn refresh_session(&self) -> RolegateResult<Option<Session>> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }

        let outcome = *self.outcome.lock().unwrap();
        match outcome {
            RefreshOutcome::Renew => {
                let mut stored = self.stored.lock().unwrap();
                let renewed = stored
                    .as_ref()
                    .map(|session| session.renewed(ChronoDuration::minutes(30)));
                *stored = renewed.clone();
                Ok(renewed)
            }
            RefreshOutcome::Absent => Ok(None),
            RefreshOutcome::Fail => Err(RolegateError::Network {
                message: "connection reset by peer".to_string(),
                source: None,
                context: ErrorContext::new("scripted_store"),
            }),
        }
    }

    async fn clear_session(&self) -> RolegateResult<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        self.set_stored(None);
        Ok(())
    }
}

/// Lookup whose backend is down
pub struct FailingLookup;

#[async_trait]
impl RoleLookup for FailingLookup {
    async fn current_role(&self) -> RolegateResult<Option<String>> {
        Err(RolegateError::Network {
            message: "role service unavailable".to_string(),
            source: None,
            context: ErrorContext::new("failing_lookup"),
        })
    }
}

pub fn roles() -> RoleConfig {
    RoleConfig::new("superAdmin", "admin", "user")
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        refresh_timeout_ms: 200,
        clear_retry: RetryConfig {
            max_attempts: 1,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            backoff_multiplier: 1.0,
            jitter: false,
        },
        ..SessionSettings::default()
    }
}

pub fn session(id: u64, role: Option<&str>) -> Session {
    let mut user = SessionUser::new(id, format!("user{}", id));
    user.role = role.map(str::to_string);
    Session::new(format!("token-{}", id), user)
}

pub fn resolver(
    store: &Arc<ScriptedStore>,
    lookup: Arc<dyn RoleLookup>,
    settings: SessionSettings,
) -> SessionRoleResolver {
    SessionRoleResolver::new(store.clone(), lookup, roles(), settings)
}
