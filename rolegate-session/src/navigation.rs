//! Navigation events
//!
//! Carries the current route path to whoever needs to react to it. Subscribers
//! are woken only when the path actually changes.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct NavigationBus {
    current: Arc<watch::Sender<String>>,
}

impl NavigationBus {
    pub fn new(initial_path: &str) -> Self {
        let (current, _) = watch::channel(normalize_path(initial_path));
        Self {
            current: Arc::new(current),
        }
    }

    /// Move to `path`. Returns whether subscribers were notified.
    pub fn navigate(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.current.send_if_modified(|current| {
            if *current == path {
                return false;
            }
            debug!(from = %current, to = %path, "Navigation");
            *current = path;
            true
        })
    }

    pub fn current(&self) -> String {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.current.subscribe()
    }
}

impl Default for NavigationBus {
    fn default() -> Self {
        Self::new("/")
    }
}

/// Strip query and fragment, force a leading slash, drop trailing slashes
pub fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default().trim();
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed)
    }
}
