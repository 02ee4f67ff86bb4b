//! Core data type definitions

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Authenticated session: an opaque credential plus a snapshot of the user profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque credential issued by the identity provider
    pub token: String,
    /// Identity fields that came with the credential
    pub user: SessionUser,
    pub issued_at: DateTime<Utc>,
    /// None means the credential never expires locally
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// User identity carried by a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: u64,
    pub username: String,
    /// Role name as issued by the external system
    #[serde(default)]
    pub role: Option<String>,
    /// Arbitrary extra profile fields
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub profile: HashMap<String, serde_json::Value>,
}

/// What identifies "the same session" for role re-resolution purposes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    pub user_id: u64,
    pub role: Option<String>,
}

impl Session {
    pub fn new(token: impl Into<String>, user: SessionUser) -> Self {
        Self {
            token: token.into(),
            user,
            issued_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Expire `ttl` after issue. A ttl past the representable range means no expiry.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = self.issued_at.checked_add_signed(ttl);
        self
    }

    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            user_id: self.user.id,
            role: self.user.role.clone(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Copy of this session with a new issue time and expiry
    pub fn renewed(&self, ttl: Duration) -> Self {
        Self {
            token: self.token.clone(),
            user: self.user.clone(),
            issued_at: Utc::now(),
            expires_at: None,
        }
        .with_ttl(ttl)
    }
}

impl SessionUser {
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            role: None,
            profile: HashMap::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_profile_field(mut self, key: &str, value: serde_json::Value) -> Self {
        self.profile.insert(key.to_string(), value);
        self
    }
}

/// Ordered permission tier derived from a role name
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RoleLevel {
    #[default]
    Uninitialized = 0,
    Standard = 1,
    Admin = 2,
    SuperAdmin = 3,
}

impl RoleLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for RoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleLevel::Uninitialized => write!(f, "uninitialized"),
            RoleLevel::Standard => write!(f, "standard"),
            RoleLevel::Admin => write!(f, "admin"),
            RoleLevel::SuperAdmin => write!(f, "super_admin"),
        }
    }
}

impl FromStr for RoleLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "uninitialized" | "none" | "0" => Ok(RoleLevel::Uninitialized),
            "standard" | "1" => Ok(RoleLevel::Standard),
            "admin" | "2" => Ok(RoleLevel::Admin),
            "super_admin" | "superadmin" | "3" => Ok(RoleLevel::SuperAdmin),
            _ => Err(format!("Unknown role level: {}", s)),
        }
    }
}

/// The three role names recognized by the external system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleConfig {
    pub super_admin: String,
    pub admin: String,
    pub default_role: String,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            super_admin: "superAdmin".to_string(),
            admin: "admin".to_string(),
            default_role: "user".to_string(),
        }
    }
}

impl RoleConfig {
    pub fn new(
        super_admin: impl Into<String>,
        admin: impl Into<String>,
        default_role: impl Into<String>,
    ) -> Self {
        Self {
            super_admin: super_admin.into(),
            admin: admin.into(),
            default_role: default_role.into(),
        }
    }

    /// Map a role name to its level, checking SuperAdmin, then Admin, then Standard.
    ///
    /// Returns `None` for any name outside the configured set, including the empty string.
    pub fn level_for(&self, role: &str) -> Option<RoleLevel> {
        [
            (self.super_admin.as_str(), RoleLevel::SuperAdmin),
            (self.admin.as_str(), RoleLevel::Admin),
            (self.default_role.as_str(), RoleLevel::Standard),
        ]
        .into_iter()
        .find(|(name, _)| !name.is_empty() && *name == role)
        .map(|(_, level)| level)
    }

    /// Configured role name for a level, if the level has one
    pub fn name_for(&self, level: RoleLevel) -> Option<&str> {
        match level {
            RoleLevel::Uninitialized => None,
            RoleLevel::Standard => Some(&self.default_role),
            RoleLevel::Admin => Some(&self.admin),
            RoleLevel::SuperAdmin => Some(&self.super_admin),
        }
    }
}

/// One guarded route of the console
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Path prefix, matched on segment boundaries
    pub path: String,
    pub title: String,
    /// Lowest level allowed in; `Uninitialized` makes the route public
    #[serde(default)]
    pub min_level: RoleLevel,
    #[serde(default = "default_show_in_menu")]
    pub show_in_menu: bool,
}

fn default_show_in_menu() -> bool {
    true
}

impl RouteRule {
    pub fn new(path: impl Into<String>, title: impl Into<String>, min_level: RoleLevel) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            min_level,
            show_in_menu: true,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.show_in_menu = false;
        self
    }

    /// Whether `path` falls under this rule
    pub fn matches(&self, path: &str) -> bool {
        let prefix = self.path.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}
