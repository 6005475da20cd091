//! Engine configuration.
//!
//! Loaded via the `config` crate from environment variables (with `__`
//! as the nesting separator) or from a TOML file. Role strings in the
//! policy table are operator input, not store data, so unknown values
//! are rejected at load time rather than silently down-ranked.

use serde::Deserialize;
use std::path::Path;

use crate::error::PolicyError;
use crate::policy::{PathPolicy, PolicyEntry};
use crate::rate_limit::RateLimitConfig;
use crate::role::Role;

/// One policy rule as written in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyEntryConfig {
    /// The path prefix this rule covers.
    pub prefix: String,
    /// The minimum role name required under this prefix.
    pub required_role: String,
}

/// Configuration for the role authorization engine.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    /// Path policy rules. An empty table leaves every path public.
    #[serde(default)]
    pub policy: Vec<PolicyEntryConfig>,

    /// Redirect target when no identity is present.
    #[serde(default = "default_sign_in_path")]
    pub sign_in_path: String,

    /// Redirect target when the identity's role is insufficient.
    #[serde(default = "default_access_denied_path")]
    pub access_denied_path: String,

    /// Bound on each external store call, in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Age after which a session is due for a background drift check,
    /// in seconds.
    #[serde(default = "default_staleness_window_seconds")]
    pub staleness_window_seconds: i64,

    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_sign_in_path() -> String {
    "/auth/signin".to_string()
}

fn default_access_denied_path() -> String {
    "/access-denied".to_string()
}

fn default_store_timeout_ms() -> u64 {
    5000
}

fn default_staleness_window_seconds() -> i64 {
    300
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            policy: Vec::new(),
            sign_in_path: default_sign_in_path(),
            access_denied_path: default_access_denied_path(),
            store_timeout_ms: default_store_timeout_ms(),
            staleness_window_seconds: default_staleness_window_seconds(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl AccessConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if present configuration values are invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or invalid.
    pub fn from_file(path: &Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()
    }

    /// Builds the path policy from this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate prefixes or role names outside
    /// the closed set; both must be fixed at load time, never at
    /// request time.
    pub fn build_policy(&self) -> Result<PathPolicy, PolicyError> {
        let entries = self
            .policy
            .iter()
            .map(|entry| {
                let required =
                    Role::parse(&entry.required_role).ok_or_else(|| PolicyError::UnknownRole {
                        value: entry.required_role.clone(),
                    })?;
                Ok(PolicyEntry::new(entry.prefix.clone(), required))
            })
            .collect::<Result<Vec<_>, PolicyError>>()?;
        PathPolicy::new(entries, &self.sign_in_path, &self.access_denied_path)
    }

    /// Returns the store timeout as a duration.
    #[must_use]
    pub fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store_timeout_ms)
    }

    /// Returns the staleness window as a duration.
    #[must_use]
    pub fn staleness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_window_seconds)
    }
}
