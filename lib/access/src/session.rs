//! Session value objects.
//!
//! A `Session` represents the caller's current authentication state: an
//! optional identity, an optional role claim, an optional bearer token,
//! and an expiry. The engine treats a session as immutable within one
//! evaluation; updates produce a new `Session` value rather than mutating
//! in place.

use chrono::{DateTime, Duration, Utc};
use rolegate_core::UserId;
use serde::{Deserialize, Serialize};

use crate::role::Role;

/// The authenticated identity carried by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// The user's ID.
    pub user_id: UserId,
    /// Display name (optional).
    pub display_name: Option<String>,
    /// Email address (optional).
    pub email: Option<String>,
    /// Avatar image URL (optional).
    pub avatar_url: Option<String>,
}

impl Identity {
    /// Creates a new identity with only a user ID.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            display_name: None,
            email: None,
            avatar_url: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: Option<String>) -> Self {
        self.display_name = name;
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    /// Sets the avatar URL.
    #[must_use]
    pub fn with_avatar_url(mut self, url: Option<String>) -> Self {
        self.avatar_url = url;
        self
    }
}

/// An authentication state snapshot.
///
/// Sessions are produced by the session store after authentication. The
/// role claim is cached from the identity store at creation time and may
/// drift from the durable value until reconciled (see
/// [`Reconciler`](crate::reconcile::Reconciler)).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The authenticated identity, if any.
    identity: Option<Identity>,
    /// The cached role claim.
    role: Option<Role>,
    /// Bearer token for API calls that need it.
    access_token: Option<String>,
    /// When the session was created.
    created_at: DateTime<Utc>,
    /// When the session expires.
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new session valid for the given duration.
    #[must_use]
    pub fn new(identity: Option<Identity>, role: Option<Role>, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            identity,
            role,
            access_token: None,
            created_at: now,
            expires_at: now + duration,
        }
    }

    /// Creates a session carrying a bearer token.
    #[must_use]
    pub fn with_token(
        identity: Option<Identity>,
        role: Option<Role>,
        duration: Duration,
        access_token: String,
    ) -> Self {
        let mut session = Self::new(identity, role, duration);
        session.access_token = Some(access_token);
        session
    }

    /// Returns the identity, if the session is authenticated.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Returns the cached role claim.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Returns the bearer token, if present.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Returns when the session was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the session expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the session is still valid (not expired).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_expired()
    }

    /// Returns a new session with the role claim replaced.
    ///
    /// Identity, tokens, and timestamps are retained. The original value
    /// is untouched; the engine never mutates a session in place.
    #[must_use]
    pub fn with_role(&self, role: Option<Role>) -> Self {
        let mut session = self.clone();
        session.role = role;
        session
    }
}

/// A partial update applied to a stored session.
///
/// Each field uses an outer `Option` for "leave unchanged" and an inner
/// value for the replacement (which may itself clear the field).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPatch {
    /// Replacement role claim, if any.
    pub role: Option<Option<Role>>,
    /// Replacement bearer token, if any.
    pub access_token: Option<Option<String>>,
}

impl SessionPatch {
    /// Creates a patch that replaces only the role claim.
    #[must_use]
    pub fn role(role: Option<Role>) -> Self {
        Self {
            role: Some(role),
            access_token: None,
        }
    }

    /// Applies this patch to a session, producing a new value.
    #[must_use]
    pub fn apply(&self, session: &Session) -> Session {
        let mut updated = session.clone();
        if let Some(role) = self.role {
            updated.role = role;
        }
        if let Some(token) = &self.access_token {
            updated.access_token = token.clone();
        }
        updated
    }
}
