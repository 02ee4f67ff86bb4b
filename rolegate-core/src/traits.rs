//! Core trait definitions
//!
//! The resolver consumes these collaborators; it never implements them itself.

use crate::error::RolegateResult;
use crate::types::Session;
use async_trait::async_trait;

/// Persistence for the session credential
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the persisted session, if any
    async fn get_session(&self) -> RolegateResult<Option<Session>>;

    /// Exchange the current credential for a renewed one.
    ///
    /// `Ok(None)` is an explicit "no session" answer, not an error.
    async fn refresh_session(&self) -> RolegateResult<Option<Session>>;

    /// Remove the persisted credential. Must be idempotent.
    async fn clear_session(&self) -> RolegateResult<()>;
}

/// Source of the current role name
#[async_trait]
pub trait RoleLookup: Send + Sync {
    /// `Ok(None)` means no role is assigned yet, e.g. not authenticated
    async fn current_role(&self) -> RolegateResult<Option<String>>;
}
