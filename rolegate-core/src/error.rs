//! Error types shared by the rolegate crates
//!
//! Every variant except the `#[from]` conversions carries an `ErrorContext` so a
//! logged failure can be traced back to the component and operation that raised it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, warn};

pub type RolegateResult<T> = Result<T, RolegateError>;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Where and when an error was raised, plus hints for the operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Correlates the log line with whatever the user reports
    pub error_id: String,
    pub timestamp: DateTime<Utc>,
    pub component: String,
    pub operation: Option<String>,
    pub metadata: HashMap<String, String>,
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

#[derive(Error, Debug)]
pub enum RolegateError {
    /// A token store could not read, write or remove the credential
    #[error("Token storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<BoxedSource>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxedSource>,
        context: ErrorContext,
    },

    /// A remote token store or role service did not answer properly
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<BoxedSource>,
        context: ErrorContext,
    },

    #[error("Operation timeout: {operation} after {duration_ms}ms")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    /// The role lookup returned a name outside the configured role set
    #[error("Unrecognized role: {role:?}")]
    UnrecognizedRole { role: String, context: ErrorContext },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RolegateError {
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            RolegateError::Storage { context, .. }
            | RolegateError::Config { context, .. }
            | RolegateError::Network { context, .. }
            | RolegateError::Timeout { context, .. }
            | RolegateError::UnrecognizedRole { context, .. } => Some(context),
            RolegateError::Io(_) | RolegateError::Serialization(_) => None,
        }
    }

    /// Whether trying the same operation again may succeed.
    ///
    /// Malformed data, bad configuration and unknown roles stay wrong on retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RolegateError::Storage { .. }
                | RolegateError::Network { .. }
                | RolegateError::Timeout { .. }
                | RolegateError::Io(_)
        )
    }

    /// Shortest sensible wait before retrying, `None` when retrying is pointless
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            RolegateError::Network { .. } => Some(1000),
            RolegateError::Timeout { .. } => Some(500),
            RolegateError::Storage { .. } | RolegateError::Io(_) => Some(50),
            _ => None,
        }
    }

    /// Log at `warn` for transient failures and `error` for everything else
    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str());
        let component = self.context().map(|c| c.component.as_str());

        match self {
            RolegateError::UnrecognizedRole { role, .. } => {
                error!(error_id = ?error_id, role = %role, "Role name is not configured");
            }
            _ if self.is_recoverable() => {
                warn!(
                    error_id = ?error_id,
                    component = ?component,
                    error = %self,
                    "Transient failure"
                );
            }
            _ => {
                error!(
                    error_id = ?error_id,
                    component = ?component,
                    error = %self,
                    "Operation failed"
                );
            }
        }
    }
}

/// Build a `RolegateError::Storage`, optionally wrapping the underlying error
#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $component:expr) => {
        $crate::RolegateError::Storage {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::RolegateError::Storage {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check permissions on the session file"),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverability_follows_variant() {
        let storage = storage_error!("disk busy", "file_store");
        assert!(storage.is_recoverable());
        assert_eq!(storage.retry_delay_ms(), Some(50));
        assert_eq!(storage.context().map(|c| c.component.as_str()), Some("file_store"));

        let malformed = RolegateError::from(
            serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
        );
        assert!(!malformed.is_recoverable());
        assert_eq!(malformed.retry_delay_ms(), None);
        assert!(malformed.context().is_none());

        let role = RolegateError::UnrecognizedRole {
            role: "guest".to_string(),
            context: ErrorContext::new("resolver"),
        };
        assert!(!role.is_recoverable());
        role.log();
    }
}
