use thiserror::Error;

use crate::config::LoadError;

/// Startup and backing-resource failures surfaced by the serve binary.
///
/// Stage-internal failures never reach this type; the stages recover
/// locally (fail-open for the cache, fail-safe for the governor).
#[derive(Debug, Error)]
pub enum InfraError {
    #[error(transparent)]
    Configuration(#[from] LoadError),
    #[error("database.url is required to serve")]
    MissingDatabaseUrl,
    #[error("database unavailable: {0}")]
    Database(#[from] sqlx::Error),
    #[error("telemetry setup failed: {0}")]
    Telemetry(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
