//! Path policy evaluation.
//!
//! A `PathPolicy` maps URL path prefixes to minimum required roles and
//! produces an `AuthorizationDecision` for a request path given an
//! already-fetched session. Evaluation is synchronous, total, and never
//! fails; fetching the session is the caller's responsibility.
//!
//! Matching rule: the longest configured prefix that matches the path
//! governs. A path matching no entry is public. That permissive default
//! is a deliberate choice (it mirrors the observed behavior this engine
//! replaces); a strict deployment can express deny-by-default with a
//! `("/", Role::User)` catch-all entry.

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::role::{Role, has_role};
use crate::session::Session;

/// The outcome of evaluating a session against a policy for a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AuthorizationDecision {
    /// The request may proceed.
    Allow,
    /// The request must be redirected to `target`.
    DenyRedirect { target: String },
}

impl AuthorizationDecision {
    /// Returns true if the request is allowed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Returns the redirect target for a denied request.
    #[must_use]
    pub fn redirect_target(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::DenyRedirect { target } => Some(target),
        }
    }
}

/// A single policy rule: paths under `prefix` require at least `required`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    /// The path prefix this rule covers.
    pub prefix: String,
    /// The minimum role required under this prefix.
    pub required: Role,
}

impl PolicyEntry {
    /// Creates a new policy entry.
    #[must_use]
    pub fn new(prefix: impl Into<String>, required: Role) -> Self {
        Self {
            prefix: prefix.into(),
            required,
        }
    }
}

/// Static mapping from path prefixes to minimum required roles.
///
/// Immutable after construction; a shared reference may be used
/// concurrently by any number of evaluation calls without locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPolicy {
    /// Entries sorted by descending prefix length so the first match wins.
    entries: Vec<PolicyEntry>,
    /// Redirect target when no identity is present.
    sign_in_path: String,
    /// Redirect target when the identity's role is insufficient.
    access_denied_path: String,
}

impl PathPolicy {
    /// Builds a policy from entries and fallback paths.
    ///
    /// Entries are ordered most-specific-first internally. Duplicate
    /// prefixes are rejected here, at load time, so evaluation never
    /// has to resolve an ambiguous match.
    pub fn new(
        mut entries: Vec<PolicyEntry>,
        sign_in_path: impl Into<String>,
        access_denied_path: impl Into<String>,
    ) -> Result<Self, PolicyError> {
        // Equal-length prefixes tie-break lexicographically so duplicates
        // end up adjacent for the check below.
        entries.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });
        for window in entries.windows(2) {
            if window[0].prefix == window[1].prefix {
                return Err(PolicyError::DuplicatePrefix {
                    prefix: window[0].prefix.clone(),
                });
            }
        }
        Ok(Self {
            entries,
            sign_in_path: sign_in_path.into(),
            access_denied_path: access_denied_path.into(),
        })
    }

    /// Returns the minimum role required for `path`, if any.
    ///
    /// The longest matching prefix governs; an unmatched path requires
    /// no role.
    #[must_use]
    pub fn required_role(&self, path: &str) -> Option<Role> {
        self.entries
            .iter()
            .find(|entry| path.starts_with(&entry.prefix))
            .map(|entry| entry.required)
    }

    /// Evaluates a session against this policy for a request path.
    ///
    /// Total over well-typed inputs: never fails, never panics. An
    /// expired session is treated as carrying no identity. The decision
    /// is a pure function of its inputs and therefore idempotent.
    #[must_use]
    pub fn authorize(&self, session: Option<&Session>, path: &str) -> AuthorizationDecision {
        let Some(required) = self.required_role(path) else {
            return AuthorizationDecision::Allow;
        };

        let session = session.filter(|s| s.is_valid());
        let Some(session) = session else {
            return AuthorizationDecision::DenyRedirect {
                target: self.sign_in_path.clone(),
            };
        };
        if session.identity().is_none() {
            return AuthorizationDecision::DenyRedirect {
                target: self.sign_in_path.clone(),
            };
        }

        if has_role(session.role(), required) {
            AuthorizationDecision::Allow
        } else {
            AuthorizationDecision::DenyRedirect {
                target: self.access_denied_path.clone(),
            }
        }
    }

    /// Returns the configured policy entries, most specific first.
    #[must_use]
    pub fn entries(&self) -> &[PolicyEntry] {
        &self.entries
    }

    /// Returns the sign-in redirect target.
    #[must_use]
    pub fn sign_in_path(&self) -> &str {
        &self.sign_in_path
    }

    /// Returns the access-denied redirect target.
    #[must_use]
    pub fn access_denied_path(&self) -> &str {
        &self.access_denied_path
    }
}
