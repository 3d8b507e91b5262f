//! Database pool plumbing.

use std::time::Duration;

use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};

/// Connect the shared pool with the configured bounds.
pub async fn connect(
    url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(url)
        .await
}

/// Cheap liveness probe against the backend.
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    query("SELECT 1").execute(pool).await.map(|_| ())
}
