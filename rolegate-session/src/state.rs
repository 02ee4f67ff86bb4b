//! Resolver State
//!
//! The value consumers read: session phase, role phase and caller-owned extras.

use rolegate_core::{RoleLevel, Session};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where the session fetch stands
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "session", rename_all = "snake_case")]
pub enum SessionPhase {
    /// Not known yet; a fetch or refresh is pending
    #[default]
    Loading,
    /// The store returned a session
    Resolved(Session),
    /// The store has no usable session
    Absent,
}

/// Where role resolution stands
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum RolePhase {
    #[default]
    Loading,
    /// Lookup finished; `Uninitialized` when no role is assigned
    Resolved(RoleLevel),
    /// Lookup returned a name outside the configured set
    Unrecognized(String),
    /// The lookup itself failed
    Unavailable,
}

/// Snapshot of everything a consumer can observe
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResolverState {
    pub session: SessionPhase,
    pub role: RolePhase,
    /// Free-form slot for caller-defined auxiliary data
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl SessionPhase {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionPhase::Resolved(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionPhase::Loading)
    }
}

impl RolePhase {
    /// Resolved level, `Uninitialized` for every other phase
    pub fn level(&self) -> RoleLevel {
        match self {
            RolePhase::Resolved(level) => *level,
            _ => RoleLevel::Uninitialized,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, RolePhase::Loading)
    }

    /// Loading finished without producing a level
    pub fn is_unknown(&self) -> bool {
        matches!(self, RolePhase::Unrecognized(_) | RolePhase::Unavailable)
    }
}

impl ResolverState {
    pub fn session(&self) -> Option<&Session> {
        self.session.session()
    }

    pub fn is_session_loading(&self) -> bool {
        self.session.is_loading()
    }

    pub fn role_level(&self) -> RoleLevel {
        self.role.level()
    }

    pub fn is_role_loading(&self) -> bool {
        self.role.is_loading()
    }

    pub fn extra(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }

    /// Short description for logging
    pub fn summary(&self) -> String {
        let session = match &self.session {
            SessionPhase::Loading => "loading".to_string(),
            SessionPhase::Resolved(session) => format!("user={}", session.user.id),
            SessionPhase::Absent => "absent".to_string(),
        };
        let role = match &self.role {
            RolePhase::Loading => "loading".to_string(),
            RolePhase::Resolved(level) => level.to_string(),
            RolePhase::Unrecognized(name) => format!("unrecognized({})", name),
            RolePhase::Unavailable => "unavailable".to_string(),
        };
        format!("ResolverState[session={}, role={}]", session, role)
    }
}
