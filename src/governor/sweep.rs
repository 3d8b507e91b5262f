//! Idle-session sweeps.
//!
//! Two tiers of reclamation against the backend's finite connection slots:
//!
//! - **Periodic sweep**: at most once per `sweep_interval`, terminates
//!   sessions that have sat in plain `idle` state longer than `idle_ttl`.
//!   Idle-in-transaction sessions are left alone here; they may hold locks
//!   mid-business-transaction and are reclaimed only by the emergency tier.
//! - **Emergency sweep**: when the connection count exceeds the emergency
//!   threshold, terminates every idle and idle-in-transaction session
//!   regardless of age.
//!
//! Snapshot reads are fail-safe: when the catalog cannot be read, the
//! emergency condition is assumed and the sweep runs anyway. Over-aggressive
//! cleanup is preferred to slot exhaustion. Cache/store errors elsewhere are
//! fail-open; this asymmetry is deliberate.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, error, warn};

use crate::util::lock::mutex_lock;

#[cfg(test)]
use super::catalog::CatalogError;
use super::catalog::{SessionCatalog, SessionState};
use super::config::GovernorConfig;

const SOURCE: &str = "governor::sweep";

const METRIC_GOVERNOR_TERMINATED_TOTAL: &str = "scudo_governor_terminated_total";
const METRIC_GOVERNOR_SWEEP_MS: &str = "scudo_governor_sweep_ms";

/// Threshold-driven session reclamation over a [`SessionCatalog`].
pub struct Sweeper {
    catalog: Arc<dyn SessionCatalog>,
    config: GovernorConfig,
    last_sweep: Mutex<Option<Instant>>,
}

impl Sweeper {
    pub fn new(catalog: Arc<dyn SessionCatalog>, config: GovernorConfig) -> Self {
        Self {
            catalog,
            config,
            last_sweep: Mutex::new(None),
        }
    }

    /// Cheap best-effort check before delegating a request. Runs the
    /// emergency sweep when the connection count is over the emergency
    /// threshold, or when the count cannot be read at all.
    pub async fn precheck(&self) {
        match self.catalog.snapshot().await {
            Ok(snapshot) if snapshot.total > self.config.emergency_connections => {
                error!(
                    total = snapshot.total,
                    emergency_connections = self.config.emergency_connections,
                    "connection count over emergency threshold"
                );
                self.emergency_sweep("emergency threshold exceeded").await;
            }
            Ok(snapshot) => {
                debug!(total = snapshot.total, "connection pre-check passed");
            }
            Err(err) => {
                error!(error = %err, "session catalog unreadable, assuming emergency");
                self.emergency_sweep("session catalog unreadable").await;
            }
        }
    }

    /// Periodic sweep, inline at request end, gated to at most once per
    /// `sweep_interval`.
    pub async fn sweep_if_due(&self) {
        {
            let mut last_sweep = mutex_lock(&self.last_sweep, SOURCE, "sweep_if_due");
            let due = match *last_sweep {
                None => true,
                Some(at) => at.elapsed() >= self.config.sweep_interval,
            };
            if !due {
                return;
            }
            *last_sweep = Some(Instant::now());
        }

        self.threshold_sweep().await;
    }

    async fn threshold_sweep(&self) {
        let started_at = Instant::now();

        let snapshot = match self.catalog.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(error = %err, "session catalog unreadable, assuming emergency");
                self.emergency_sweep("session catalog unreadable").await;
                return;
            }
        };

        if snapshot.total > self.config.warning_connections {
            warn!(
                total = snapshot.total,
                active = snapshot.active,
                idle = snapshot.idle,
                idle_in_transaction = snapshot.idle_in_transaction,
                warning_connections = self.config.warning_connections,
                "connection count elevated"
            );
        }

        let sessions = match self.catalog.sessions().await {
            Ok(sessions) => sessions,
            Err(err) => {
                error!(error = %err, "session listing failed, assuming emergency");
                self.emergency_sweep("session listing failed").await;
                return;
            }
        };

        let mut terminated = 0u64;
        for session in sessions {
            if session.state != SessionState::Idle || session.idle_for <= self.config.idle_ttl {
                continue;
            }
            match self.catalog.terminate(session.pid).await {
                Ok(true) => terminated += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(pid = session.pid, error = %err, "session termination failed");
                }
            }
        }

        if terminated > 0 {
            counter!(METRIC_GOVERNOR_TERMINATED_TOTAL, "tier" => "periodic").increment(terminated);
            warn!(
                terminated,
                idle_ttl_secs = self.config.idle_ttl.as_secs(),
                "terminated stale idle sessions"
            );
        }

        histogram!(METRIC_GOVERNOR_SWEEP_MS, "tier" => "periodic")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
    }

    /// Terminate every idle and idle-in-transaction session of the current
    /// database, regardless of idle duration. The catalog already excludes
    /// the caller's own backend. Returns the number terminated.
    pub async fn emergency_sweep(&self, reason: &'static str) -> u64 {
        let started_at = Instant::now();

        let sessions = match self.catalog.sessions().await {
            Ok(sessions) => sessions,
            Err(err) => {
                error!(reason, error = %err, "emergency sweep could not list sessions");
                return 0;
            }
        };

        let mut terminated = 0u64;
        for session in sessions {
            if !matches!(
                session.state,
                SessionState::Idle | SessionState::IdleInTransaction
            ) {
                continue;
            }
            match self.catalog.terminate(session.pid).await {
                Ok(true) => terminated += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(pid = session.pid, error = %err, "session termination failed");
                }
            }
        }

        counter!(METRIC_GOVERNOR_TERMINATED_TOTAL, "tier" => "emergency").increment(terminated);
        histogram!(METRIC_GOVERNOR_SWEEP_MS, "tier" => "emergency")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        error!(reason, terminated, "emergency sweep completed");

        terminated
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::governor::catalog::{ConnectionSnapshot, SessionInfo};

    /// In-memory catalog. `snapshot: None` simulates an unreadable catalog.
    struct FakeCatalog {
        snapshot: Mutex<Option<ConnectionSnapshot>>,
        sessions: Mutex<Vec<SessionInfo>>,
        terminated: Mutex<Vec<i32>>,
    }

    impl FakeCatalog {
        fn new(snapshot: Option<ConnectionSnapshot>, sessions: Vec<SessionInfo>) -> Arc<Self> {
            Arc::new(Self {
                snapshot: Mutex::new(snapshot),
                sessions: Mutex::new(sessions),
                terminated: Mutex::new(Vec::new()),
            })
        }

        fn terminated(&self) -> Vec<i32> {
            self.terminated.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionCatalog for FakeCatalog {
        async fn snapshot(&self) -> Result<ConnectionSnapshot, CatalogError> {
            self.snapshot
                .lock()
                .unwrap()
                .ok_or_else(|| CatalogError::Query(sqlx::Error::PoolClosed))
        }

        async fn sessions(&self) -> Result<Vec<SessionInfo>, CatalogError> {
            Ok(self.sessions.lock().unwrap().clone())
        }

        async fn terminate(&self, pid: i32) -> Result<bool, CatalogError> {
            let mut sessions = self.sessions.lock().unwrap();
            let before = sessions.len();
            sessions.retain(|session| session.pid != pid);
            let existed = sessions.len() < before;
            if existed {
                self.terminated.lock().unwrap().push(pid);
            }
            Ok(existed)
        }
    }

    fn session(pid: i32, state: SessionState, idle_secs: u64) -> SessionInfo {
        SessionInfo {
            pid,
            state,
            idle_for: Duration::from_secs(idle_secs),
        }
    }

    fn snapshot(total: i64) -> ConnectionSnapshot {
        ConnectionSnapshot {
            total,
            ..Default::default()
        }
    }

    fn mixed_sessions() -> Vec<SessionInfo> {
        vec![
            session(101, SessionState::Active, 0),
            session(102, SessionState::Idle, 400),
            session(103, SessionState::Idle, 10),
            session(104, SessionState::IdleInTransaction, 400),
            session(105, SessionState::Other, 9000),
        ]
    }

    #[tokio::test]
    async fn precheck_at_emergency_threshold_terminates_nothing() {
        let catalog = FakeCatalog::new(Some(snapshot(80)), mixed_sessions());
        let sweeper = Sweeper::new(catalog.clone(), GovernorConfig::default());

        sweeper.precheck().await;

        assert!(catalog.terminated().is_empty());
    }

    #[tokio::test]
    async fn precheck_above_emergency_threshold_sweeps_idle_and_idle_in_transaction() {
        let catalog = FakeCatalog::new(Some(snapshot(81)), mixed_sessions());
        let sweeper = Sweeper::new(catalog.clone(), GovernorConfig::default());

        sweeper.precheck().await;

        // Every idle session goes, fresh or stale, plus the idle
        // transaction; active and unrecognized states stay.
        assert_eq!(catalog.terminated(), vec![102, 103, 104]);
    }

    #[tokio::test]
    async fn unreadable_catalog_assumes_emergency() {
        let catalog = FakeCatalog::new(None, mixed_sessions());
        let sweeper = Sweeper::new(catalog.clone(), GovernorConfig::default());

        sweeper.precheck().await;

        assert_eq!(catalog.terminated(), vec![102, 103, 104]);
    }

    #[tokio::test]
    async fn emergency_sweep_twice_is_a_no_op_the_second_time() {
        let catalog = FakeCatalog::new(Some(snapshot(81)), mixed_sessions());
        let sweeper = Sweeper::new(catalog.clone(), GovernorConfig::default());

        let first = sweeper.emergency_sweep("test").await;
        let second = sweeper.emergency_sweep("test").await;

        assert_eq!(first, 3);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn periodic_sweep_terminates_only_stale_plain_idle_sessions() {
        let catalog = FakeCatalog::new(Some(snapshot(10)), mixed_sessions());
        let sweeper = Sweeper::new(catalog.clone(), GovernorConfig::default());

        sweeper.sweep_if_due().await;

        // Only the idle session past the 300s TTL. The fresh idle session
        // and the idle transaction survive the periodic tier.
        assert_eq!(catalog.terminated(), vec![102]);
    }

    #[tokio::test]
    async fn periodic_sweep_is_interval_gated() {
        let catalog = FakeCatalog::new(Some(snapshot(10)), mixed_sessions());
        let sweeper = Sweeper::new(catalog.clone(), GovernorConfig::default());

        sweeper.sweep_if_due().await;
        catalog
            .sessions
            .lock()
            .unwrap()
            .push(session(106, SessionState::Idle, 500));
        sweeper.sweep_if_due().await;

        // The second call lands inside the 30s interval and does nothing.
        assert_eq!(catalog.terminated(), vec![102]);
    }

    #[tokio::test]
    async fn periodic_sweep_with_unreadable_catalog_falls_back_to_emergency() {
        let catalog = FakeCatalog::new(None, mixed_sessions());
        let sweeper = Sweeper::new(catalog.clone(), GovernorConfig::default());

        sweeper.sweep_if_due().await;

        assert_eq!(catalog.terminated(), vec![102, 103, 104]);
    }

    #[tokio::test]
    async fn idle_exactly_at_ttl_survives_the_periodic_sweep() {
        let sessions = vec![session(200, SessionState::Idle, 300)];
        let catalog = FakeCatalog::new(Some(snapshot(10)), sessions);
        let sweeper = Sweeper::new(catalog.clone(), GovernorConfig::default());

        sweeper.sweep_if_due().await;

        assert!(catalog.terminated().is_empty());
    }
}
