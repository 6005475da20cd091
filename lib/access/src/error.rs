//! Error types for the access crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StoreError`: Failures reaching the external session/identity stores
//! - `PolicyError`: Configuration-load-time policy problems
//! - `BootstrapError`: Failures of the explicit dev seeding operation
//!
//! The authorization decision itself (`PathPolicy::authorize`) is total
//! and has no error type; malformed role strings degrade to no access at
//! the boundary rather than erroring.

use rolegate_core::UserId;
use std::fmt;

/// Errors from external store operations.
///
/// All variants are recoverable: the caller should present a retry
/// affordance, and the in-memory session state is never corrupted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached.
    Unavailable { details: String },
    /// The store call exceeded the configured deadline.
    Timeout { after_ms: u64 },
    /// The operation requires an authenticated session and none exists.
    SessionMissing,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => {
                write!(f, "store unavailable: {details}")
            }
            Self::Timeout { after_ms } => {
                write!(f, "store call timed out after {after_ms}ms")
            }
            Self::SessionMissing => {
                write!(f, "no authenticated session")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from policy configuration loading.
///
/// These are resolved at configuration-load time; the request-time
/// evaluation path never produces them because an unmatched path is
/// public by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Two policy entries share the same prefix.
    DuplicatePrefix { prefix: String },
    /// A configured role string is outside the closed role set.
    UnknownRole { value: String },
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicatePrefix { prefix } => {
                write!(f, "duplicate policy prefix: {prefix}")
            }
            Self::UnknownRole { value } => {
                write!(f, "unknown role in policy configuration: {value}")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

/// Errors from the development seeding operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// Seeding was attempted outside a development environment.
    NotPermitted { environment: String },
    /// The target identity does not exist in the identity store.
    IdentityNotFound { user_id: UserId },
    /// The identity store could not be reached.
    StoreUnavailable { details: String },
}

impl fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPermitted { environment } => {
                write!(f, "seeding is not permitted in {environment}")
            }
            Self::IdentityNotFound { user_id } => {
                write!(f, "identity not found: {user_id}")
            }
            Self::StoreUnavailable { details } => {
                write!(f, "identity store unavailable: {details}")
            }
        }
    }
}

impl std::error::Error for BootstrapError {}
