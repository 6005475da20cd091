//! External store contracts and in-memory implementations.
//!
//! The engine does no I/O of its own; it calls into two opaque
//! asynchronous collaborators:
//! - [`SessionStore`]: holds the current session token and accepts
//!   partial updates.
//! - [`IdentityStore`]: the durable source of truth for a user's role.
//!
//! The in-memory implementations back tests and local development. In
//! production these traits are implemented over whatever shared store
//! the deployment uses; keeping the abstraction injected (rather than a
//! module-level global) is what makes that swap possible.

use async_trait::async_trait;
use rootcause::prelude::Report;
use rolegate_core::UserId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::error::StoreError;
use crate::role::Role;
use crate::session::{Session, SessionPatch};

/// Holds the caller's current session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Reads the current session, if any. May suspend on I/O.
    async fn read(&self) -> Result<Option<Session>, Report<StoreError>>;

    /// Applies a partial update to the current session and returns the
    /// updated value. May suspend on I/O; fails with
    /// [`StoreError::SessionMissing`] when no session exists.
    async fn update(&self, patch: SessionPatch) -> Result<Session, Report<StoreError>>;
}

/// Durable source of truth for user roles.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Looks up the current role for an identity. May suspend on I/O.
    ///
    /// Returns `None` when the identity is not found, which callers must
    /// treat as the most restrictive outcome (no role).
    async fn find_role(&self, user_id: UserId) -> Result<Option<Role>, Report<StoreError>>;
}

/// Write access to the identity store's role column.
///
/// Separate from [`IdentityStore`] because the authorization engine only
/// ever reads roles; writing is reserved for administrative tooling and
/// the explicit dev seeding operation.
#[async_trait]
pub trait RoleWriter: Send + Sync {
    /// Replaces the stored role for an identity.
    async fn set_role(&self, user_id: UserId, role: Role) -> Result<(), Report<StoreError>>;
}

/// In-memory session store for tests and local development.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    session: Arc<RwLock<Option<Session>>>,
}

impl InMemorySessionStore {
    /// Creates an empty store (no active session).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given session.
    #[must_use]
    pub fn with_session(session: Session) -> Self {
        Self {
            session: Arc::new(RwLock::new(Some(session))),
        }
    }

    /// Replaces the stored session (sign-in).
    pub fn set_session(&self, session: Session) {
        *self.session.write().unwrap() = Some(session);
    }

    /// Removes the stored session (sign-out).
    pub fn clear(&self) {
        *self.session.write().unwrap() = None;
    }
}

impl Clone for InMemorySessionStore {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn read(&self) -> Result<Option<Session>, Report<StoreError>> {
        Ok(self.session.read().unwrap().clone())
    }

    async fn update(&self, patch: SessionPatch) -> Result<Session, Report<StoreError>> {
        let mut guard = self.session.write().unwrap();
        let Some(current) = guard.as_ref() else {
            return Err(StoreError::SessionMissing.into());
        };
        let updated = patch.apply(current);
        *guard = Some(updated.clone());
        debug!("session updated");
        Ok(updated)
    }
}

/// In-memory identity store for tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    roles: Arc<RwLock<HashMap<UserId, Role>>>,
}

impl InMemoryIdentityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes an identity from the store.
    pub fn remove(&self, user_id: UserId) {
        self.roles.write().unwrap().remove(&user_id);
    }
}

impl Clone for InMemoryIdentityStore {
    fn clone(&self) -> Self {
        Self {
            roles: Arc::clone(&self.roles),
        }
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_role(&self, user_id: UserId) -> Result<Option<Role>, Report<StoreError>> {
        Ok(self.roles.read().unwrap().get(&user_id).copied())
    }
}

#[async_trait]
impl RoleWriter for InMemoryIdentityStore {
    async fn set_role(&self, user_id: UserId, role: Role) -> Result<(), Report<StoreError>> {
        self.roles.write().unwrap().insert(user_id, role);
        debug!(%user_id, %role, "role written");
        Ok(())
    }
}
