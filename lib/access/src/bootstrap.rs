//! Development-only role seeding.
//!
//! A fresh deployment has no administrators, so nothing can reach the
//! admin pages to grant the role. The original workaround of silently
//! promoting the first user is replaced by an explicit, environment-
//! gated operation: it must be invoked deliberately, it only works in
//! development, and it is not part of the authorization or
//! reconciliation contracts.

use rootcause::prelude::Report;
use rolegate_core::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::error::BootstrapError;
use crate::role::Role;
use crate::store::{IdentityStore, RoleWriter};

/// Deployment environment gate for seeding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development; seeding permitted.
    Development,
    /// Everything else; seeding refused.
    #[default]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

/// Promotes an existing identity to admin in a development environment.
///
/// Refuses outside development, and refuses identities the store does
/// not know. Returns the role that was written. The caller still has to
/// reconcile any active session for the change to take effect there.
pub async fn promote_to_admin<S>(
    store: &S,
    user_id: UserId,
    environment: Environment,
) -> Result<Role, Report<BootstrapError>>
where
    S: IdentityStore + RoleWriter,
{
    if environment != Environment::Development {
        return Err(BootstrapError::NotPermitted {
            environment: environment.to_string(),
        }
        .into());
    }

    let existing = store
        .find_role(user_id)
        .await
        .map_err(|e| BootstrapError::StoreUnavailable {
            details: e.to_string(),
        })?;
    if existing.is_none() {
        return Err(BootstrapError::IdentityNotFound { user_id }.into());
    }

    store
        .set_role(user_id, Role::Admin)
        .await
        .map_err(|e| BootstrapError::StoreUnavailable {
            details: e.to_string(),
        })?;

    info!(%user_id, "identity promoted to admin");
    Ok(Role::Admin)
}
