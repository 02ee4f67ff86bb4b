//! Rolegate Session - session and role resolution for client consoles
//!
//! This crate keeps an authenticated session and the role level derived from it,
//! and answers the questions UI layers ask of them:
//!
//! - Who is logged in, and is that still being fetched?
//! - Which role level does the user have?
//! - May the current route be shown, and which menu entries are visible?
//!
//! ## Architecture
//!
//! - **Core** (rolegate-core): data model, collaborator traits, errors, config
//! - **Session** (this crate): resolver, bundled stores and lookups, route gating
//! - **Presentation** (rolegate-cli): user interface

pub mod lookup;
pub mod navigation;
pub mod resolver;
pub mod routes;
pub mod state;
pub mod store;

pub use lookup::{SessionRoleLookup, StaticRoleLookup};
pub use navigation::{normalize_path, NavigationBus};
pub use resolver::SessionRoleResolver;
pub use routes::{GateView, MenuItem, RouteDecision, RouteGuard, RouteTable};
pub use state::{ResolverState, RolePhase, SessionPhase};
pub use store::{FileTokenStore, MemoryTokenStore};
