//! Session Role Resolver
//!
//! Owns the cached session and the role level derived from it. Consumers read a
//! `ResolverState` snapshot (or subscribe to changes) and ask the resolver to
//! refresh or clear the session.
//!
//! None of the public operations return errors: failures are logged and folded
//! into a terminal state. A failed refresh clears the stored credential and
//! leaves the session absent. A failed or unrecognized role lookup leaves the
//! role unknown without touching the session.

use crate::state::{ResolverState, RolePhase, SessionPhase};
use futures::future::FutureExt;
use rolegate_core::{
    retry_async, with_timeout, ErrorContext, RoleConfig, RoleLevel, RoleLookup, RolegateConfig,
    RolegateError, Session, SessionIdentity, SessionSettings, SingleFlight, TokenStore,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Handle to the resolver; clones share the same state
#[derive(Clone)]
pub struct SessionRoleResolver {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn TokenStore>,
    lookup: Arc<dyn RoleLookup>,
    roles: RoleConfig,
    settings: SessionSettings,
    state: watch::Sender<ResolverState>,
    /// Set once the first session fetch has been started
    fetch_started: AtomicBool,
    torn_down: AtomicBool,
    /// Bumped by every role resolution; only the latest one may write
    role_generation: AtomicU64,
    /// Identity seen by the last settled session fetch; `None` before the first one
    last_identity: Mutex<Option<Option<SessionIdentity>>>,
    refresh_flight: SingleFlight<Option<Session>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionRoleResolver {
    pub fn new(
        store: Arc<dyn TokenStore>,
        lookup: Arc<dyn RoleLookup>,
        roles: RoleConfig,
        settings: SessionSettings,
    ) -> Self {
        let (state, _) = watch::channel(ResolverState::default());

        Self {
            inner: Arc::new(Inner {
                store,
                lookup,
                roles,
                settings,
                state,
                fetch_started: AtomicBool::new(false),
                torn_down: AtomicBool::new(false),
                role_generation: AtomicU64::new(0),
                last_identity: Mutex::new(None),
                refresh_flight: SingleFlight::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn from_config(
        store: Arc<dyn TokenStore>,
        lookup: Arc<dyn RoleLookup>,
        config: &RolegateConfig,
    ) -> Self {
        Self::new(
            store,
            lookup,
            config.roles.clone(),
            config.session.clone(),
        )
    }

    pub fn roles(&self) -> &RoleConfig {
        &self.inner.roles
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    /// Start the initial session fetch and role resolution in the background
    pub fn mount(&self) {
        self.inner.fetch_started.store(true, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        self.spawn(async move {
            inner.load().await;
        });

        let inner = Arc::clone(&self.inner);
        self.spawn(async move {
            inner.resolve_role().await;
        });
    }

    /// Run the initial session fetch and role resolution and wait for both
    pub async fn initialize(&self) -> ResolverState {
        self.inner.fetch_started.store(true, Ordering::SeqCst);
        let session_inner = Arc::clone(&self.inner);
        let role_inner = Arc::clone(&self.inner);
        tokio::join!(session_inner.load(), role_inner.resolve_role());
        self.snapshot()
    }

    /// Cached session.
    ///
    /// The first call starts a background fetch from the token store, so callers
    /// must tolerate `None` until the state stops loading.
    pub fn session(&self) -> Option<Session> {
        let cached = self.inner.state.borrow().session().cloned();

        if !self.inner.fetch_started.swap(true, Ordering::SeqCst) {
            let inner = Arc::clone(&self.inner);
            if !self.spawn(async move {
                inner.load().await;
            }) {
                self.inner.fetch_started.store(false, Ordering::SeqCst);
            }
        }

        cached
    }

    /// Fetch the session from the token store and wait for the result
    pub async fn load_session(&self) -> Option<Session> {
        self.inner.fetch_started.store(true, Ordering::SeqCst);
        Arc::clone(&self.inner).load().await
    }

    /// Ask the token store for a renewed session.
    ///
    /// The return value is the new source of truth. `None` means the session is
    /// gone and stored credentials have been cleared.
    pub async fn refresh_session(&self) -> Option<Session> {
        if self.inner.is_torn_down() {
            debug!("Ignoring refresh on torn-down resolver");
            return None;
        }

        if self.inner.settings.single_flight_refresh {
            let inner = Arc::clone(&self.inner);
            self.inner
                .refresh_flight
                .run(move || inner.refresh().boxed())
                .await
        } else {
            Arc::clone(&self.inner).refresh().await
        }
    }

    /// Derive the role level from the role lookup
    pub async fn resolve_role_level(&self) -> RoleLevel {
        Arc::clone(&self.inner).resolve_role().await
    }

    /// Logout: clear stored credentials and mark the session absent
    pub async fn clear_session(&self) {
        let inner = Arc::clone(&self.inner);
        inner.clear_stored().await;
        inner.settle_session(None).await;
    }

    pub fn snapshot(&self) -> ResolverState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that is notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<ResolverState> {
        self.inner.state.subscribe()
    }

    pub fn set_extra(&self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        self.inner.update(move |state| {
            if state.extra.get(&key) == Some(&value) {
                return false;
            }
            state.extra.insert(key, value);
            true
        });
    }

    pub fn remove_extra(&self, key: &str) -> Option<serde_json::Value> {
        let mut removed = None;
        self.inner.update(|state| {
            removed = state.extra.remove(key);
            removed.is_some()
        });
        removed
    }

    /// Abandon pending work. Nothing writes to the state afterwards.
    pub fn teardown(&self) {
        // Flipped under the channel's write lock so no in-progress write can slip past it
        let mut already = false;
        self.inner.state.send_if_modified(|_| {
            already = self.inner.torn_down.swap(true, Ordering::SeqCst);
            false
        });
        if already {
            return;
        }

        let tasks = std::mem::take(&mut *lock(&self.inner.tasks));
        debug!(pending = tasks.len(), "Tearing down session resolver");
        for task in tasks {
            task.abort();
        }
        self.inner.refresh_flight.forget();
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.is_torn_down()
    }

    /// Spawn a task tracked for teardown. Returns false when no tokio runtime is running.
    fn spawn<F>(&self, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.inner.is_torn_down() {
            return false;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime available, session fetch not started");
            return false;
        };

        let handle = runtime.spawn(future);
        let mut tasks = lock(&self.inner.tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
        true
    }
}

impl Inner {
    fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Apply a state change unless torn down. `modify` returns whether it changed anything.
    ///
    /// The teardown flag is read under the channel's write lock, where `teardown` sets it.
    fn update<F>(&self, modify: F) -> bool
    where
        F: FnOnce(&mut ResolverState) -> bool,
    {
        self.state.send_if_modified(|state| {
            if self.is_torn_down() {
                debug!("Discarding state write after teardown");
                return false;
            }
            modify(state)
        })
    }

    async fn load(self: Arc<Self>) -> Option<Session> {
        debug!("Loading session from token store");
        let outcome = with_timeout(
            self.store.get_session(),
            self.settings.refresh_timeout_ms,
            "get_session",
        )
        .await
        .and_then(|result| result);

        let session = match outcome {
            Ok(session) => session,
            Err(e) => {
                e.log();
                warn!("Could not read stored session, treating it as absent");
                None
            }
        };

        self.settle_session(session.clone()).await;
        session
    }

    async fn refresh(self: Arc<Self>) -> Option<Session> {
        self.update(|state| {
            if state.session.is_loading() {
                return false;
            }
            state.session = SessionPhase::Loading;
            true
        });

        debug!("Refreshing session");
        let outcome = with_timeout(
            self.store.refresh_session(),
            self.settings.refresh_timeout_ms,
            "refresh_session",
        )
        .await
        .and_then(|result| result);

        let session = match outcome {
            Ok(Some(session)) => {
                info!(user_id = session.user.id, "Session refreshed");
                Some(session)
            }
            Ok(None) => {
                info!("Token store reported no session, clearing credentials");
                self.clear_stored().await;
                None
            }
            Err(e) => {
                e.log();
                warn!("Session refresh failed, clearing credentials");
                self.clear_stored().await;
                None
            }
        };

        self.settle_session(session.clone()).await;
        session
    }

    async fn clear_stored(&self) {
        let store = Arc::clone(&self.store);
        let result = retry_async(
            move || {
                let store = Arc::clone(&store);
                async move { store.clear_session().await }.boxed()
            },
            &self.settings.clear_retry,
            "clear_session",
        )
        .await;

        if let Err(e) = result {
            error!(error = %e, "Failed to clear stored credentials");
        }
    }

    /// Record the outcome of a fetch and re-resolve the role if the identity moved
    async fn settle_session(self: &Arc<Self>, session: Option<Session>) {
        let identity = session.as_ref().map(Session::identity);
        let phase = match session {
            Some(session) => SessionPhase::Resolved(session),
            None => SessionPhase::Absent,
        };

        self.update(move |state| {
            if state.session == phase {
                return false;
            }
            state.session = phase;
            true
        });

        if self.is_torn_down() {
            return;
        }

        let identity_changed = {
            let mut last = lock(&self.last_identity);
            let changed = matches!(&*last, Some(previous) if *previous != identity);
            *last = Some(identity);
            changed
        };

        if identity_changed && self.settings.reresolve_role_on_session_change {
            debug!("Session identity changed, re-resolving role");
            Arc::clone(self).resolve_role().await;
        }
    }

    async fn resolve_role(self: Arc<Self>) -> RoleLevel {
        let generation = self.role_generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.update(|state| {
            if state.role.is_loading() {
                return false;
            }
            state.role = RolePhase::Loading;
            true
        });

        let outcome = with_timeout(
            self.lookup.current_role(),
            self.settings.refresh_timeout_ms,
            "current_role",
        )
        .await
        .and_then(|result| result);

        let phase = match outcome {
            Ok(None) => {
                debug!("No role assigned");
                RolePhase::Resolved(RoleLevel::Uninitialized)
            }
            Ok(Some(name)) => match self.roles.level_for(&name) {
                Some(level) => {
                    debug!(role = %name, level = %level, "Role resolved");
                    RolePhase::Resolved(level)
                }
                None => {
                    RolegateError::UnrecognizedRole {
                        role: name.clone(),
                        context: ErrorContext::new("resolver")
                            .with_operation("resolve_role_level")
                            .with_suggestion("Add the role name to the [roles] section"),
                    }
                    .log();
                    RolePhase::Unrecognized(name)
                }
            },
            Err(e) => {
                e.log();
                warn!("Role lookup failed, role left unresolved");
                RolePhase::Unavailable
            }
        };

        let level = phase.level();
        let role_generation = &self.role_generation;
        self.update(move |state| {
            if role_generation.load(Ordering::SeqCst) != generation {
                debug!(generation, "Discarding superseded role resolution");
                return false;
            }
            if state.role == phase {
                return false;
            }
            state.role = phase;
            true
        });

        level
    }
}

// Poisoning only means another task panicked while holding the lock
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
