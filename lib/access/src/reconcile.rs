//! Session/store reconciliation protocol.
//!
//! A session caches its role claim at creation time. When the durable
//! identity store changes afterwards, the cached claim drifts from the
//! stored truth until an explicit refresh runs. This module makes that
//! correction a two-phase protocol: [`Reconciler::check_drift`] is a
//! read-only comparison, [`Reconciler::reconcile`] performs the session
//! write and re-evaluates the active path under the corrected session.
//!
//! One cycle runs at a time per reconciler: the identity-store read
//! always completes and is compared before any session-store write is
//! issued, and a concurrent trigger waits for the in-flight cycle
//! instead of starting another. Store failures are fail-open: the last
//! known-good session stays in force and the error is surfaced for a
//! retry affordance.

use chrono::Utc;
use rootcause::prelude::Report;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::policy::{AuthorizationDecision, PathPolicy};
use crate::role::Role;
use crate::session::{Session, SessionPatch};
use crate::store::{IdentityStore, SessionStore};

/// Default bound on each external store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of comparing a session's role claim against the identity store.
///
/// Ephemeral: computed on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftReport {
    /// The role cached in the session.
    pub session_role: Option<Role>,
    /// The role currently stored for the identity.
    pub store_role: Option<Role>,
    /// Whether the two diverge.
    pub changed: bool,
}

impl DriftReport {
    /// Builds a report from the two role views.
    #[must_use]
    pub fn new(session_role: Option<Role>, store_role: Option<Role>) -> Self {
        Self {
            session_role,
            store_role,
            changed: session_role != store_role,
        }
    }
}

/// Observable phase of the reconciliation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    /// No cycle in progress.
    Idle,
    /// Reading the identity store for comparison.
    Checking,
    /// Drift detected; awaiting explicit confirmation to write.
    Stale,
    /// Writing the corrected role to the session store.
    Reconciling,
}

/// Outcome of a reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The session already matched the store; nothing was written.
    UpToDate {
        /// The comparison that found no drift.
        drift: DriftReport,
    },
    /// The session was corrected.
    Updated {
        /// The new session value.
        session: Session,
        /// The drift that triggered the write.
        drift: DriftReport,
        /// The active path re-evaluated under the new session. A page
        /// denied under the stale role may now be allowed, and vice
        /// versa; the caller should re-render or redirect accordingly.
        decision: AuthorizationDecision,
    },
}

impl ReconcileOutcome {
    /// Returns true if a session update was written.
    #[must_use]
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }

    /// Returns the drift report from this cycle.
    #[must_use]
    pub fn drift(&self) -> DriftReport {
        match self {
            Self::UpToDate { drift } | Self::Updated { drift, .. } => *drift,
        }
    }
}

/// Returns true if a session is due for a background drift check.
///
/// The staleness window is measured from session creation; a session
/// older than the window should be checked when it next enters a
/// protected area.
#[must_use]
pub fn needs_check(session: &Session, window: chrono::Duration) -> bool {
    Utc::now() - session.created_at() >= window
}

/// Shared state behind all clones of a reconciler.
struct ReconcilerInner {
    /// Serializes cycles; a concurrent trigger awaits the holder.
    cycle: Mutex<()>,
    state: RwLock<ReconcilerState>,
}

/// Resets the observable state when a cycle ends, including when the
/// driving future is dropped mid-flight.
struct StateGuard {
    inner: Arc<ReconcilerInner>,
    settled: bool,
}

impl StateGuard {
    fn enter(inner: &Arc<ReconcilerInner>, state: ReconcilerState) -> Self {
        *inner.state.write().unwrap() = state;
        Self {
            inner: Arc::clone(inner),
            settled: false,
        }
    }

    fn settle(mut self, state: ReconcilerState) {
        *self.inner.state.write().unwrap() = state;
        self.settled = true;
    }
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        if !self.settled {
            // Error return or cancelled future: the cycle is over and
            // the existing session remains in force.
            *self.inner.state.write().unwrap() = ReconcilerState::Idle;
        }
    }
}

/// Drives drift detection and correction for one session context.
pub struct Reconciler<S, I> {
    sessions: Arc<S>,
    identities: Arc<I>,
    policy: Arc<PathPolicy>,
    timeout: Duration,
    inner: Arc<ReconcilerInner>,
}

impl<S, I> Clone for Reconciler<S, I> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            identities: Arc::clone(&self.identities),
            policy: Arc::clone(&self.policy),
            timeout: self.timeout,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, I> Reconciler<S, I>
where
    S: SessionStore,
    I: IdentityStore,
{
    /// Creates a reconciler over the given stores and policy.
    #[must_use]
    pub fn new(sessions: Arc<S>, identities: Arc<I>, policy: Arc<PathPolicy>) -> Self {
        Self {
            sessions,
            identities,
            policy,
            timeout: DEFAULT_STORE_TIMEOUT,
            inner: Arc::new(ReconcilerInner {
                cycle: Mutex::new(()),
                state: RwLock::new(ReconcilerState::Idle),
            }),
        }
    }

    /// Sets the bound applied to each external store call.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the current phase of the state machine.
    #[must_use]
    pub fn state(&self) -> ReconcilerState {
        *self.inner.state.read().unwrap()
    }

    /// Compares the session's role claim against the identity store.
    ///
    /// Read-only: never writes to the session store. On store failure or
    /// timeout the error is surfaced and the existing session remains in
    /// force.
    #[instrument(skip_all)]
    pub async fn check_drift(&self, session: &Session) -> Result<DriftReport, Report<StoreError>> {
        let _cycle = self.inner.cycle.lock().await;
        self.check_drift_locked(session).await
    }

    /// Detects drift and, if found, writes the stored role back into the
    /// session, then re-evaluates `active_path` under the new session.
    ///
    /// At most one session-store write is attempted per call; on write
    /// failure the state machine remains [`ReconcilerState::Stale`] and
    /// the old session is retained. A concurrent call waits for the
    /// in-flight cycle and then observes the corrected session, so two
    /// concurrent calls produce exactly one store write.
    #[instrument(skip_all, fields(path = %active_path))]
    pub async fn reconcile(
        &self,
        session: &Session,
        active_path: &str,
    ) -> Result<ReconcileOutcome, Report<StoreError>> {
        if session.identity().is_none() {
            return Err(StoreError::SessionMissing.into());
        }

        let _cycle = self.inner.cycle.lock().await;

        // A coalesced caller holds a snapshot that the cycle it waited
        // for may already have corrected; the store's view is
        // authoritative. A vanished session means the context this call
        // originated from is gone and the result would be discarded.
        let current = match self.bounded(self.sessions.read()).await? {
            Some(current) => current,
            None => return Err(StoreError::SessionMissing.into()),
        };

        let drift = self.check_drift_locked(&current).await?;
        if !drift.changed {
            return Ok(ReconcileOutcome::UpToDate { drift });
        }

        let guard = StateGuard::enter(&self.inner, ReconcilerState::Reconciling);
        let update = self.sessions.update(SessionPatch::role(drift.store_role));
        let updated = match timeout(self.timeout, update).await {
            Ok(Ok(updated)) => updated,
            Ok(Err(err)) => {
                guard.settle(ReconcilerState::Stale);
                return Err(err);
            }
            Err(_) => {
                guard.settle(ReconcilerState::Stale);
                return Err(StoreError::Timeout {
                    after_ms: self.timeout.as_millis() as u64,
                }
                .into());
            }
        };
        guard.settle(ReconcilerState::Idle);

        let decision = self.policy.authorize(Some(&updated), active_path);
        debug!(
            old = ?drift.session_role,
            new = ?drift.store_role,
            allowed = decision.is_allowed(),
            "session reconciled"
        );
        Ok(ReconcileOutcome::Updated {
            session: updated,
            drift,
            decision,
        })
    }

    async fn check_drift_locked(
        &self,
        session: &Session,
    ) -> Result<DriftReport, Report<StoreError>> {
        let Some(identity) = session.identity() else {
            return Err(StoreError::SessionMissing.into());
        };

        let guard = StateGuard::enter(&self.inner, ReconcilerState::Checking);
        // The read must complete and be compared before any write is
        // issued; an identity the store no longer knows carries no role.
        let store_role = self
            .bounded(self.identities.find_role(identity.user_id))
            .await?;
        let report = DriftReport::new(session.role(), store_role);
        guard.settle(if report.changed {
            ReconcilerState::Stale
        } else {
            ReconcilerState::Idle
        });
        debug!(changed = report.changed, "drift check complete");
        Ok(report)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, Report<StoreError>>>,
    ) -> Result<T, Report<StoreError>> {
        match timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyEntry;
    use crate::session::Identity;
    use crate::store::{InMemoryIdentityStore, InMemorySessionStore, RoleWriter};
    use async_trait::async_trait;
    use rolegate_core::UserId;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn test_policy() -> Arc<PathPolicy> {
        Arc::new(
            PathPolicy::new(
                vec![PolicyEntry::new("/admin", Role::Admin)],
                "/auth/signin",
                "/access-denied",
            )
            .expect("valid policy"),
        )
    }

    fn session_for(user_id: UserId, role: Option<Role>) -> Session {
        Session::new(Some(Identity::new(user_id)), role, chrono::Duration::hours(1))
    }

    /// Session store that counts update calls and can be made to fail them.
    struct CountingSessionStore {
        inner: InMemorySessionStore,
        updates: AtomicUsize,
        fail_updates: AtomicBool,
    }

    impl CountingSessionStore {
        fn new(session: Session) -> Self {
            Self {
                inner: InMemorySessionStore::with_session(session),
                updates: AtomicUsize::new(0),
                fail_updates: AtomicBool::new(false),
            }
        }

        fn update_count(&self) -> usize {
            self.updates.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionStore for CountingSessionStore {
        async fn read(&self) -> Result<Option<Session>, Report<StoreError>> {
            self.inner.read().await
        }

        async fn update(&self, patch: SessionPatch) -> Result<Session, Report<StoreError>> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable {
                    details: "injected failure".to_string(),
                }
                .into());
            }
            self.inner.update(patch).await
        }
    }

    /// Identity store that always fails.
    struct UnavailableIdentityStore;

    #[async_trait]
    impl IdentityStore for UnavailableIdentityStore {
        async fn find_role(&self, _user_id: UserId) -> Result<Option<Role>, Report<StoreError>> {
            Err(StoreError::Unavailable {
                details: "injected failure".to_string(),
            }
            .into())
        }
    }

    /// Identity store whose first lookup hangs until cancelled.
    struct SlowOnceIdentityStore {
        inner: InMemoryIdentityStore,
        slow: AtomicBool,
    }

    #[async_trait]
    impl IdentityStore for SlowOnceIdentityStore {
        async fn find_role(&self, user_id: UserId) -> Result<Option<Role>, Report<StoreError>> {
            if self.slow.swap(false, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.inner.find_role(user_id).await
        }
    }

    #[tokio::test]
    async fn drift_detected_when_store_role_differs() {
        let user_id = UserId::new();
        let identities = Arc::new(InMemoryIdentityStore::new());
        identities.set_role(user_id, Role::Admin).await.expect("set");
        let session = session_for(user_id, Some(Role::User));
        let sessions = Arc::new(InMemorySessionStore::with_session(session.clone()));
        let reconciler = Reconciler::new(sessions, identities, test_policy());

        let report = reconciler.check_drift(&session).await.expect("check");
        assert!(report.changed);
        assert_eq!(report.session_role, Some(Role::User));
        assert_eq!(report.store_role, Some(Role::Admin));
        assert_eq!(reconciler.state(), ReconcilerState::Stale);
    }

    #[tokio::test]
    async fn no_drift_when_roles_equal() {
        let user_id = UserId::new();
        let identities = Arc::new(InMemoryIdentityStore::new());
        identities.set_role(user_id, Role::User).await.expect("set");
        let session = session_for(user_id, Some(Role::User));
        let sessions = Arc::new(InMemorySessionStore::with_session(session.clone()));
        let reconciler = Reconciler::new(sessions, identities, test_policy());

        let report = reconciler.check_drift(&session).await.expect("check");
        assert!(!report.changed);
        assert_eq!(reconciler.state(), ReconcilerState::Idle);
    }

    #[tokio::test]
    async fn unknown_identity_carries_no_role() {
        let user_id = UserId::new();
        let identities = Arc::new(InMemoryIdentityStore::new());
        let session = session_for(user_id, Some(Role::User));
        let sessions = Arc::new(InMemorySessionStore::with_session(session.clone()));
        let reconciler = Reconciler::new(sessions, identities, test_policy());

        let report = reconciler.check_drift(&session).await.expect("check");
        assert!(report.changed);
        assert_eq!(report.store_role, None);
    }

    #[tokio::test]
    async fn check_drift_without_identity_fails() {
        let session = Session::new(None, None, chrono::Duration::hours(1));
        let reconciler = Reconciler::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryIdentityStore::new()),
            test_policy(),
        );

        let result = reconciler.check_drift(&session).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn check_drift_fails_open_on_store_failure() {
        let user_id = UserId::new();
        let session = session_for(user_id, Some(Role::User));
        let sessions = Arc::new(InMemorySessionStore::with_session(session.clone()));
        let reconciler = Reconciler::new(
            Arc::clone(&sessions),
            Arc::new(UnavailableIdentityStore),
            test_policy(),
        );

        let result = reconciler.check_drift(&session).await;
        assert!(result.is_err());
        // The existing session remains in force and the cycle is over.
        assert_eq!(reconciler.state(), ReconcilerState::Idle);
        assert_eq!(sessions.read().await.expect("read"), Some(session));
    }

    #[tokio::test]
    async fn check_drift_times_out() {
        let user_id = UserId::new();
        let session = session_for(user_id, Some(Role::User));
        let identities = Arc::new(SlowOnceIdentityStore {
            inner: InMemoryIdentityStore::new(),
            slow: AtomicBool::new(true),
        });
        let reconciler = Reconciler::new(
            Arc::new(InMemorySessionStore::with_session(session.clone())),
            identities,
            test_policy(),
        )
        .with_timeout(Duration::from_millis(10));

        let result = reconciler.check_drift(&session).await;
        assert!(result.is_err());
        assert_eq!(reconciler.state(), ReconcilerState::Idle);
    }

    #[tokio::test]
    async fn reconcile_updates_session_and_reevaluates_path() {
        let user_id = UserId::new();
        let identities = Arc::new(InMemoryIdentityStore::new());
        identities.set_role(user_id, Role::Admin).await.expect("set");
        let session = session_for(user_id, Some(Role::User));
        let sessions = Arc::new(InMemorySessionStore::with_session(session.clone()));
        let reconciler = Reconciler::new(Arc::clone(&sessions), identities, test_policy());

        // Denied under the stale role.
        assert!(!test_policy().authorize(Some(&session), "/admin").is_allowed());

        let outcome = reconciler.reconcile(&session, "/admin").await.expect("reconcile");
        match outcome {
            ReconcileOutcome::Updated {
                session: updated,
                drift,
                decision,
            } => {
                assert_eq!(updated.role(), Some(Role::Admin));
                assert!(drift.changed);
                // Allowed under the corrected role.
                assert_eq!(decision, AuthorizationDecision::Allow);
            }
            ReconcileOutcome::UpToDate { .. } => panic!("expected an update"),
        }

        let stored = sessions.read().await.expect("read").expect("session");
        assert_eq!(stored.role(), Some(Role::Admin));
        assert_eq!(reconciler.state(), ReconcilerState::Idle);
    }

    #[tokio::test]
    async fn reconcile_demotion_revokes_access() {
        let user_id = UserId::new();
        let identities = Arc::new(InMemoryIdentityStore::new());
        identities.set_role(user_id, Role::User).await.expect("set");
        let session = session_for(user_id, Some(Role::Admin));
        let sessions = Arc::new(InMemorySessionStore::with_session(session.clone()));
        let reconciler = Reconciler::new(sessions, identities, test_policy());

        let outcome = reconciler.reconcile(&session, "/admin").await.expect("reconcile");
        match outcome {
            ReconcileOutcome::Updated { decision, .. } => {
                assert_eq!(decision.redirect_target(), Some("/access-denied"));
            }
            ReconcileOutcome::UpToDate { .. } => panic!("expected an update"),
        }
    }

    #[tokio::test]
    async fn reconcile_up_to_date_writes_nothing() {
        let user_id = UserId::new();
        let identities = Arc::new(InMemoryIdentityStore::new());
        identities.set_role(user_id, Role::User).await.expect("set");
        let session = session_for(user_id, Some(Role::User));
        let sessions = Arc::new(CountingSessionStore::new(session.clone()));
        let reconciler = Reconciler::new(Arc::clone(&sessions), identities, test_policy());

        let outcome = reconciler.reconcile(&session, "/admin").await.expect("reconcile");
        assert!(!outcome.is_updated());
        assert_eq!(sessions.update_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_reconciles_coalesce_to_one_write() {
        let user_id = UserId::new();
        let identities = Arc::new(InMemoryIdentityStore::new());
        identities.set_role(user_id, Role::Admin).await.expect("set");
        let session = session_for(user_id, Some(Role::User));
        let sessions = Arc::new(CountingSessionStore::new(session.clone()));
        let reconciler = Reconciler::new(Arc::clone(&sessions), identities, test_policy());

        let (first, second) = tokio::join!(
            reconciler.reconcile(&session, "/admin"),
            reconciler.reconcile(&session, "/admin"),
        );
        let first = first.expect("first reconcile");
        let second = second.expect("second reconcile");

        // Exactly one of the two performed the write; the other observed
        // the already-corrected session.
        assert_eq!(sessions.update_count(), 1);
        assert!(first.is_updated() ^ second.is_updated());
    }

    #[tokio::test]
    async fn failed_write_retains_old_session_and_stays_stale() {
        let user_id = UserId::new();
        let identities = Arc::new(InMemoryIdentityStore::new());
        identities.set_role(user_id, Role::Admin).await.expect("set");
        let session = session_for(user_id, Some(Role::User));
        let sessions = Arc::new(CountingSessionStore::new(session.clone()));
        sessions.fail_updates.store(true, Ordering::SeqCst);
        let reconciler = Reconciler::new(Arc::clone(&sessions), identities, test_policy());

        let result = reconciler.reconcile(&session, "/admin").await;
        assert!(result.is_err());
        // One attempt, no retry, old session retained, drift still pending.
        assert_eq!(sessions.update_count(), 1);
        assert_eq!(reconciler.state(), ReconcilerState::Stale);
        let stored = sessions.read().await.expect("read").expect("session");
        assert_eq!(stored.role(), Some(Role::User));
    }

    #[tokio::test]
    async fn cancelled_cycle_leaves_reconciler_usable() {
        let user_id = UserId::new();
        let identities = Arc::new(SlowOnceIdentityStore {
            inner: InMemoryIdentityStore::new(),
            slow: AtomicBool::new(true),
        });
        identities
            .inner
            .set_role(user_id, Role::Admin)
            .await
            .expect("set");
        let session = session_for(user_id, Some(Role::User));
        let sessions = Arc::new(InMemorySessionStore::with_session(session.clone()));
        let reconciler = Reconciler::new(sessions, identities, test_policy());

        // Tear the request context down while the identity read hangs.
        let in_flight = reconciler.clone();
        let moved_session = session.clone();
        let handle =
            tokio::spawn(async move { in_flight.reconcile(&moved_session, "/admin").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();
        assert!(handle.await.is_err());

        // The discarded cycle released everything; a fresh one succeeds.
        assert_eq!(reconciler.state(), ReconcilerState::Idle);
        let outcome = reconciler.reconcile(&session, "/admin").await.expect("reconcile");
        assert!(outcome.is_updated());
    }

    #[tokio::test]
    async fn reconcile_after_sign_out_reports_missing_session() {
        let user_id = UserId::new();
        let identities = Arc::new(InMemoryIdentityStore::new());
        identities.set_role(user_id, Role::Admin).await.expect("set");
        let session = session_for(user_id, Some(Role::User));
        let sessions = Arc::new(InMemorySessionStore::new());
        let reconciler = Reconciler::new(sessions, identities, test_policy());

        let result = reconciler.reconcile(&session, "/admin").await;
        assert!(result.is_err());
    }

    #[test]
    fn needs_check_respects_window() {
        let session = session_for(UserId::new(), Some(Role::User));
        assert!(!needs_check(&session, chrono::Duration::minutes(5)));
        assert!(needs_check(&session, chrono::Duration::seconds(0)));
    }

    #[test]
    fn drift_report_changed_flag() {
        assert!(!DriftReport::new(Some(Role::User), Some(Role::User)).changed);
        assert!(DriftReport::new(Some(Role::User), Some(Role::Admin)).changed);
        assert!(DriftReport::new(None, Some(Role::User)).changed);
        assert!(!DriftReport::new(None, None).changed);
    }
}
