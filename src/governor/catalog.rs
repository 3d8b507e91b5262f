//! Session catalog access.
//!
//! Reads the backend's live-connection view (`pg_stat_activity`) and exposes
//! the termination primitive (`pg_terminate_backend`). Every read is
//! immediately stale; the governor compensates by re-reading rather than
//! locking. Terminating an already-gone session is a no-op, which is what
//! makes concurrent sweeps safe.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use thiserror::Error;

/// Connection counts for the current database at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub total: i64,
    pub active: i64,
    pub idle: i64,
    pub idle_in_transaction: i64,
}

/// Backend session state as reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Idle,
    IdleInTransaction,
    /// Fastpath/aborted/background states the governor never touches.
    Other,
}

impl SessionState {
    fn from_catalog(raw: Option<&str>) -> Self {
        match raw {
            Some("active") => SessionState::Active,
            Some("idle") => SessionState::Idle,
            Some("idle in transaction") => SessionState::IdleInTransaction,
            _ => SessionState::Other,
        }
    }
}

/// One live backend session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub pid: i32,
    pub state: SessionState,
    /// Time since the session last changed state. For idle sessions this
    /// is how long they have been idle.
    pub idle_for: Duration,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("session catalog query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Read and termination access to the backend's session catalog.
#[async_trait]
pub trait SessionCatalog: Send + Sync {
    /// Connection counts for the current database.
    async fn snapshot(&self) -> Result<ConnectionSnapshot, CatalogError>;

    /// Sessions of the current database, excluding the caller's own
    /// backend. The governor must never terminate the session it is
    /// speaking through.
    async fn sessions(&self) -> Result<Vec<SessionInfo>, CatalogError>;

    /// Terminate one session. Returns `false` when the session was
    /// already gone; repeated termination is a no-op, not an error.
    async fn terminate(&self, pid: i32) -> Result<bool, CatalogError>;
}

/// `pg_stat_activity`-backed catalog.
pub struct PgSessionCatalog {
    pool: PgPool,
}

impl PgSessionCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionCatalog for PgSessionCatalog {
    async fn snapshot(&self) -> Result<ConnectionSnapshot, CatalogError> {
        let row = sqlx::query(
            "SELECT count(*) AS total, \
                    count(*) FILTER (WHERE state = 'active') AS active, \
                    count(*) FILTER (WHERE state = 'idle') AS idle, \
                    count(*) FILTER (WHERE state = 'idle in transaction') AS idle_in_transaction \
             FROM pg_stat_activity \
             WHERE datname = current_database()",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(ConnectionSnapshot {
            total: row.try_get("total")?,
            active: row.try_get("active")?,
            idle: row.try_get("idle")?,
            idle_in_transaction: row.try_get("idle_in_transaction")?,
        })
    }

    async fn sessions(&self) -> Result<Vec<SessionInfo>, CatalogError> {
        let rows = sqlx::query(
            "SELECT pid, state, \
                    COALESCE(EXTRACT(EPOCH FROM (now() - state_change)), 0)::double precision \
                        AS state_age_seconds \
             FROM pg_stat_activity \
             WHERE datname = current_database() \
               AND pid <> pg_backend_pid()",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let state: Option<String> = row.try_get("state")?;
                let state_age_seconds: f64 = row.try_get("state_age_seconds")?;
                Ok(SessionInfo {
                    pid: row.try_get("pid")?,
                    state: SessionState::from_catalog(state.as_deref()),
                    idle_for: Duration::from_secs_f64(state_age_seconds.max(0.0)),
                })
            })
            .collect()
    }

    async fn terminate(&self, pid: i32) -> Result<bool, CatalogError> {
        let terminated: bool = sqlx::query_scalar("SELECT pg_terminate_backend($1)")
            .bind(pid)
            .fetch_one(&self.pool)
            .await?;
        Ok(terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_states_map_to_session_states() {
        assert_eq!(
            SessionState::from_catalog(Some("active")),
            SessionState::Active
        );
        assert_eq!(SessionState::from_catalog(Some("idle")), SessionState::Idle);
        assert_eq!(
            SessionState::from_catalog(Some("idle in transaction")),
            SessionState::IdleInTransaction
        );
        assert_eq!(
            SessionState::from_catalog(Some("idle in transaction (aborted)")),
            SessionState::Other
        );
        assert_eq!(SessionState::from_catalog(None), SessionState::Other);
    }
}
