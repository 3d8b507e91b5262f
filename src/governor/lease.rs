//! Request-scoped connection lease.
//!
//! One `ConnectionLease` is attached to every request by the governor
//! stage. Handlers acquire through it and park the connection back when a
//! query finishes, so one pooled connection serves the whole request. At
//! request end the governor releases whatever is still parked; the release
//! is guaranteed by [`ReleaseGuard`] even when the handler panics or the
//! request future is dropped mid-flight.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use axum::{body::Body, http::Request};
use sqlx::{PgPool, Postgres, pool::PoolConnection};
use tracing::debug;

use crate::util::lock::mutex_lock;

const SOURCE: &str = "governor::lease";

/// Per-request connection cache over the shared pool.
pub struct ConnectionLease {
    pool: PgPool,
    parked: Mutex<Option<PoolConnection<Postgres>>>,
    releases: AtomicUsize,
}

impl ConnectionLease {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            parked: Mutex::new(None),
            releases: AtomicUsize::new(0),
        }
    }

    /// The lease attached to a request, if the governor stage ran.
    pub fn of(request: &Request<Body>) -> Option<Arc<ConnectionLease>> {
        request.extensions().get::<Arc<ConnectionLease>>().cloned()
    }

    /// Check out a connection, reusing the parked one when present.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, sqlx::Error> {
        if let Some(conn) = mutex_lock(&self.parked, SOURCE, "acquire").take() {
            return Ok(conn);
        }
        self.pool.acquire().await
    }

    /// Park a connection for reuse by the request's next query. When a
    /// connection is already parked the newcomer drops straight back to
    /// the pool.
    pub fn park(&self, conn: PoolConnection<Postgres>) {
        let mut parked = mutex_lock(&self.parked, SOURCE, "park");
        if parked.is_none() {
            *parked = Some(conn);
        }
    }

    /// Number of connections currently parked on this lease.
    pub fn held(&self) -> usize {
        usize::from(mutex_lock(&self.parked, SOURCE, "held").is_some())
    }

    /// Drop every parked connection back to the pool. Idempotent; returns
    /// the number of connections released by this call.
    pub fn release_all(&self) -> usize {
        let released = match mutex_lock(&self.parked, SOURCE, "release_all").take() {
            Some(conn) => {
                drop(conn);
                1
            }
            None => 0,
        };
        self.releases.fetch_add(1, Ordering::Relaxed);
        released
    }

    /// How many times release ran for this lease. The governor expects
    /// exactly one by request end.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::Relaxed)
    }
}

/// Guaranteed-cleanup handle around a lease.
///
/// Dropping the guard releases the lease, so the release also runs when
/// the delegate panics or the request future is cancelled. The normal
/// path consumes the guard through [`ReleaseGuard::release`] instead, and
/// the drop hook stands down.
pub struct ReleaseGuard {
    lease: Arc<ConnectionLease>,
    armed: bool,
}

impl ReleaseGuard {
    pub fn new(lease: Arc<ConnectionLease>) -> Self {
        Self { lease, armed: true }
    }

    /// Release now and disarm the drop hook.
    pub fn release(mut self) -> usize {
        self.armed = false;
        let released = self.lease.release_all();
        if released > 0 {
            debug!(released, "released request connections");
        }
        released
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if self.armed {
            let released = self.lease.release_all();
            debug!(released, "released request connections on abnormal exit");
        }
    }
}
