//! Configuration management

use crate::async_utils::RetryConfig;
use crate::error::{ErrorContext, RolegateError, RolegateResult};
use crate::logging::LoggingConfig;
use crate::types::{RoleConfig, RoleLevel, RouteRule};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolegateConfig {
    pub roles: RoleConfig,
    pub session: SessionSettings,
    pub logging: LoggingConfig,
    /// Route table used for route gating and menu derivation
    #[serde(rename = "route")]
    pub routes: Vec<RouteRule>,
}

impl Default for RolegateConfig {
    fn default() -> Self {
        Self {
            roles: RoleConfig::default(),
            session: SessionSettings::default(),
            logging: LoggingConfig::default(),
            routes: vec![
                RouteRule::new("/", "Home", RoleLevel::Uninitialized),
                RouteRule::new("/login", "Login", RoleLevel::Uninitialized).hidden(),
                RouteRule::new("/profile", "Profile", RoleLevel::Standard),
                RouteRule::new("/audit", "Audit", RoleLevel::Admin),
                RouteRule::new("/admin", "Administration", RoleLevel::SuperAdmin),
            ],
        }
    }
}

/// Resolver behaviour knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Upper bound for a single token store call
    pub refresh_timeout_ms: u64,
    /// Concurrent refresh calls share one in-flight store refresh
    pub single_flight_refresh: bool,
    /// Re-run role resolution whenever the session's user or role changes
    pub reresolve_role_on_session_change: bool,
    /// Lifetime granted by the bundled stores on login and refresh
    pub session_ttl_minutes: i64,
    /// Retries for clearing credentials after a failed refresh
    pub clear_retry: RetryConfig,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_timeout_ms: 10_000,
            single_flight_refresh: true,
            reresolve_role_on_session_change: true,
            session_ttl_minutes: 60,
            clear_retry: RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 50,
                max_delay_ms: 1000,
                backoff_multiplier: 2.0,
                jitter: true,
            },
        }
    }
}

/// Longest session lifetime accepted from configuration: ten years
pub const MAX_SESSION_TTL_MINUTES: i64 = 10 * 366 * 24 * 60;

impl SessionSettings {
    /// Configured session lifetime; errors when the minute count is out of range
    pub fn session_ttl(&self) -> RolegateResult<chrono::Duration> {
        if !(1..=MAX_SESSION_TTL_MINUTES).contains(&self.session_ttl_minutes) {
            return Err(ttl_out_of_range(self.session_ttl_minutes));
        }
        chrono::Duration::try_minutes(self.session_ttl_minutes)
            .ok_or_else(|| ttl_out_of_range(self.session_ttl_minutes))
    }
}

fn ttl_out_of_range(minutes: i64) -> RolegateError {
    RolegateError::Config {
        message: format!(
            "Session session_ttl_minutes must be between 1 and {}, got {}",
            MAX_SESSION_TTL_MINUTES, minutes
        ),
        source: None,
        context: ErrorContext::new("config")
            .with_operation("session_ttl")
            .with_suggestion("Set session.session_ttl_minutes to a positive value of at most ten years"),
    }
}

impl RolegateConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> RolegateResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| RolegateError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_metadata("path", &path.display().to_string())
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: RolegateConfig = toml::from_str(&content).map_err(|e| RolegateError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> RolegateResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| RolegateError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, content).map_err(|e| RolegateError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> RolegateResult<()> {
        let role_names = [
            ("roles.superAdmin", &self.roles.super_admin),
            ("roles.admin", &self.roles.admin),
            ("roles.defaultRole", &self.roles.default_role),
        ];
        for (field, name) in role_names {
            if name.trim().is_empty() {
                return Err(Self::invalid(
                    &format!("Role name {} must not be empty", field),
                    &format!("Set {} to the role name your identity provider issues", field),
                ));
            }
        }

        if self.session.refresh_timeout_ms == 0 {
            return Err(Self::invalid(
                "Session refresh_timeout_ms must be greater than 0",
                "Set session.refresh_timeout_ms to a positive value",
            ));
        }

        self.session.session_ttl()?;

        for route in &self.routes {
            if !route.path.starts_with('/') {
                return Err(Self::invalid(
                    &format!("Route path {:?} must start with '/'", route.path),
                    "Use absolute paths such as \"/admin\" in [[route]] entries",
                ));
            }
        }

        if self.session.clear_retry.max_attempts == 0 {
            return Err(Self::invalid(
                "Session clear_retry.max_attempts must be at least 1",
                "Set session.clear_retry.max_attempts to 1 or more",
            ));
        }

        Ok(())
    }

    fn invalid(message: &str, suggestion: &str) -> RolegateError {
        RolegateError::Config {
            message: message.to_string(),
            source: None,
            context: ErrorContext::new("config")
                .with_operation("validate")
                .with_suggestion(suggestion),
        }
    }
}
