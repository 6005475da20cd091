//! Request rate limiting with a swappable counter store.
//!
//! Limits are tracked per client key in fixed windows. The counter
//! store is injected rather than held in module-level state, so tests
//! and single-process deployments use the in-memory map while a
//! multi-instance deployment can back the same interface with a shared
//! external store.
//!
//! Authentication endpoints get a stricter limit than general API
//! traffic; the two tiers use separate key spaces so one cannot starve
//! the other.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum general requests per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Maximum authentication requests per window.
    #[serde(default = "default_auth_max_requests")]
    pub auth_max_requests: u32,
    /// Window duration in seconds.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u32,
}

fn default_max_requests() -> u32 {
    100
}

fn default_auth_max_requests() -> u32 {
    10
}

fn default_window_seconds() -> u32 {
    60
}

impl RateLimitConfig {
    /// Creates a configuration with explicit limits.
    #[must_use]
    pub fn new(max_requests: u32, auth_max_requests: u32, window_seconds: u32) -> Self {
        Self {
            max_requests,
            auth_max_requests,
            window_seconds,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            auth_max_requests: default_auth_max_requests(),
            window_seconds: default_window_seconds(),
        }
    }
}

/// Which limit applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitTier {
    /// General API traffic.
    Api,
    /// Authentication endpoints (stricter).
    Auth,
}

impl LimitTier {
    fn key_prefix(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Auth => "auth",
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is allowed.
    Allowed {
        remaining: u32,
        resets_at: DateTime<Utc>,
    },
    /// Rate limit exceeded.
    Exceeded {
        retry_after: Duration,
        resets_at: DateTime<Utc>,
    },
}

impl RateLimitResult {
    /// Returns true if the request is allowed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Returns the number of remaining requests (0 if exceeded).
    #[must_use]
    pub fn remaining(&self) -> u32 {
        match self {
            Self::Allowed { remaining, .. } => *remaining,
            Self::Exceeded { .. } => 0,
        }
    }
}

/// Counter state for one key's current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Number of requests counted in this window.
    pub count: u32,
    /// When this window started.
    pub started_at: DateTime<Utc>,
}

impl Window {
    /// Starts a fresh window with a single counted request.
    #[must_use]
    pub fn fresh() -> Self {
        Self {
            count: 1,
            started_at: Utc::now(),
        }
    }
}

/// Counter storage behind the rate limiter.
///
/// Implementations must be safe for concurrent use. The in-memory map
/// suits tests and single-process deployments; production deployments
/// with multiple instances should implement this over a shared store.
pub trait RateLimitStore: Send + Sync {
    /// Returns the window for a key, if one exists.
    fn get(&self, key: &str) -> Option<Window>;

    /// Replaces the window for a key.
    fn set(&self, key: &str, window: Window);

    /// Counts one request for a key and returns the resulting window.
    ///
    /// Must be a single atomic step: increment the live window, or
    /// start a fresh one when none exists or the current one has aged
    /// past `window`. Splitting the expiry check from the write would
    /// let two racing requests each start a fresh window and drop the
    /// other's count.
    fn increment(&self, key: &str, window: Duration) -> Window;
}

/// In-memory counter store.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    windows: Arc<RwLock<HashMap<String, Window>>>,
}

impl InMemoryRateLimitStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clone for InMemoryRateLimitStore {
    fn clone(&self) -> Self {
        Self {
            windows: Arc::clone(&self.windows),
        }
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn get(&self, key: &str) -> Option<Window> {
        self.windows.read().unwrap().get(key).copied()
    }

    fn set(&self, key: &str, window: Window) {
        self.windows.write().unwrap().insert(key.to_string(), window);
    }

    fn increment(&self, key: &str, window: Duration) -> Window {
        let mut windows = self.windows.write().unwrap();
        let now = Utc::now();
        match windows.get_mut(key) {
            Some(live) if now - live.started_at < window => {
                live.count += 1;
                *live
            }
            _ => {
                let fresh = Window::fresh();
                windows.insert(key.to_string(), fresh);
                fresh
            }
        }
    }
}

/// A rate limiter over an injected counter store.
pub struct RateLimiter<T> {
    config: RateLimitConfig,
    store: Arc<T>,
}

impl<T> Clone for RateLimiter<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<T: RateLimitStore> RateLimiter<T> {
    /// Creates a rate limiter with the given configuration and store.
    #[must_use]
    pub fn new(config: RateLimitConfig, store: Arc<T>) -> Self {
        Self { config, store }
    }

    /// Checks whether a request from `client` is allowed under `tier`,
    /// counting it if so.
    pub fn check_and_increment(&self, client: &str, tier: LimitTier) -> RateLimitResult {
        let key = format!("{}:{}", tier.key_prefix(), client);
        let now = Utc::now();
        let window_duration = Duration::seconds(i64::from(self.config.window_seconds));
        let limit = self.limit_for(tier);

        // Expired windows restart rather than carry their count over;
        // the store does so atomically with the count.
        let window = self.store.increment(&key, window_duration);

        let resets_at = window.started_at + window_duration;
        if window.count > limit {
            RateLimitResult::Exceeded {
                retry_after: resets_at - now,
                resets_at,
            }
        } else {
            RateLimitResult::Allowed {
                remaining: limit - window.count,
                resets_at,
            }
        }
    }

    /// Resets the counters for a client across both tiers.
    pub fn reset(&self, client: &str) {
        for tier in [LimitTier::Api, LimitTier::Auth] {
            let key = format!("{}:{}", tier.key_prefix(), client);
            self.store.set(
                &key,
                Window {
                    count: 0,
                    started_at: Utc::now(),
                },
            );
        }
    }

    /// Returns the current configuration.
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn limit_for(&self, tier: LimitTier) -> u32 {
        match tier {
            LimitTier::Api => self.config.max_requests,
            LimitTier::Auth => self.config.auth_max_requests,
        }
    }
}
