//! Connection governor stage.
//!
//! Wraps every request, cache hit or not. Per request:
//! pre-check (and, over the emergency threshold, sweep) → delegate →
//! release the request's own connections → periodic sweep when due.
//! There are no other states and the delegate is never retried here.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;
use tracing::instrument;

use super::lease::{ConnectionLease, ReleaseGuard};
use super::sweep::Sweeper;

/// Shared governor state for the middleware.
#[derive(Clone)]
pub struct GovernorState {
    pub pool: PgPool,
    pub sweeper: Arc<Sweeper>,
}

impl GovernorState {
    pub fn new(pool: PgPool, sweeper: Arc<Sweeper>) -> Self {
        Self { pool, sweeper }
    }
}

/// Connection governor middleware.
///
/// The release guard is dropped on every exit path, so connections return
/// to the pool even when the delegate panics or the request future is
/// cancelled mid-flight.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn connection_governor_layer(
    State(governor): State<GovernorState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    governor.sweeper.precheck().await;

    let lease = Arc::new(ConnectionLease::new(governor.pool.clone()));
    request.extensions_mut().insert(Arc::clone(&lease));
    let guard = ReleaseGuard::new(lease);

    let response = next.run(request).await;

    guard.release();
    governor.sweeper.sweep_if_due().await;

    response
}
