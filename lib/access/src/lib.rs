//! Role-based authorization and session reconciliation for rolegate.
//!
//! This crate provides:
//! - Role hierarchy and the satisfaction predicate (`Role`, `has_role`)
//! - Path policy evaluation (`PathPolicy`, `AuthorizationDecision`)
//! - Session value objects (`Session`, `SessionPatch`)
//! - External store contracts (`SessionStore`, `IdentityStore`)
//! - Drift detection and correction (`Reconciler`, `DriftReport`)
//! - Rate limiting over an injected counter store (`RateLimiter`)
//! - Environment-gated dev seeding (`bootstrap::promote_to_admin`)
//!
//! # Authorization Model
//!
//! Roles form a total order (`user < moderator < admin`); a path policy
//! maps URL prefixes to minimum roles, longest prefix first, with
//! unmatched paths public. The session's role claim is a cache of the
//! identity store's durable value and may drift after a role change;
//! the reconciler detects and corrects that drift on explicit request.
//!
//! # Example
//!
//! ```
//! use chrono::Duration;
//! use rolegate_access::{Identity, PathPolicy, PolicyEntry, Role, Session};
//! use rolegate_core::UserId;
//!
//! let policy = PathPolicy::new(
//!     vec![PolicyEntry::new("/admin", Role::Admin)],
//!     "/auth/signin",
//!     "/access-denied",
//! )
//! .expect("valid policy");
//!
//! let session = Session::new(
//!     Some(Identity::new(UserId::new())),
//!     Some(Role::Admin),
//!     Duration::hours(8),
//! );
//!
//! assert!(policy.authorize(Some(&session), "/admin").is_allowed());
//! assert!(policy.authorize(None, "/about").is_allowed());
//! assert!(!policy.authorize(None, "/admin").is_allowed());
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod policy;
pub mod rate_limit;
pub mod reconcile;
pub mod role;
pub mod session;
pub mod store;

// Re-export main types at crate root
pub use bootstrap::Environment;
pub use config::{AccessConfig, PolicyEntryConfig};
pub use error::{BootstrapError, PolicyError, StoreError};
pub use policy::{AuthorizationDecision, PathPolicy, PolicyEntry};
pub use rate_limit::{
    InMemoryRateLimitStore, LimitTier, RateLimitConfig, RateLimitResult, RateLimitStore,
    RateLimiter,
};
pub use reconcile::{DriftReport, ReconcileOutcome, Reconciler, ReconcilerState};
pub use role::{Role, has_role};
pub use session::{Identity, Session, SessionPatch};
pub use store::{
    IdentityStore, InMemoryIdentityStore, InMemorySessionStore, RoleWriter, SessionStore,
};
