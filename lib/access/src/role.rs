//! Role hierarchy and the role-satisfaction predicate.
//!
//! Roles form a small closed set with a total order:
//! `user < moderator < admin`. A higher role satisfies any requirement
//! at or below its own rank. Role strings arriving from external stores
//! are parsed at the boundary; unrecognized values degrade to "no role"
//! (rank 0) rather than erroring.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Authorization level for a user.
///
/// The hierarchy, from lowest to highest:
/// - `User`: access to user-level pages only
/// - `Moderator`: access to moderator and user pages
/// - `Admin`: access to all pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Standard user.
    User,
    /// Moderator with oversight of user-level content.
    Moderator,
    /// Administrator with full access.
    Admin,
}

impl Role {
    /// Returns the numeric rank of this role.
    ///
    /// Ranks are strictly increasing across the hierarchy; the absence of
    /// a role ranks 0, below every defined role.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::User => 1,
            Self::Moderator => 2,
            Self::Admin => 3,
        }
    }

    /// Parses a role string from the closed set.
    ///
    /// Returns `None` for anything outside `user`/`moderator`/`admin`.
    /// This function is total: unknown strings are not an error, they
    /// simply carry no access.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "moderator" => Some(Self::Moderator),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Parses a role string, logging unrecognized values.
    ///
    /// Use this at the boundary when the string comes from an external
    /// store; an unknown value there is a data-quality signal worth
    /// surfacing in logs, but it still degrades to no access.
    #[must_use]
    pub fn parse_lossy(value: &str) -> Option<Self> {
        let role = Self::parse(value);
        if role.is_none() {
            warn!(value, "unrecognized role string, treating as no access");
        }
        role
    }

    /// Returns the canonical string form of this role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    /// Returns true if this role has admin privileges.
    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if `candidate` satisfies the `required` role.
///
/// A candidate satisfies a requirement when its rank is at least the
/// required rank. An absent candidate ranks 0 and never satisfies any
/// requirement. Pure and total; never fails.
#[must_use]
pub fn has_role(candidate: Option<Role>, required: Role) -> bool {
    candidate.map_or(0, Role::rank) >= required.rank()
}
