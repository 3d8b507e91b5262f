//! Database-connection governance.
//!
//! The backend's connection slots are the scarce shared resource. The
//! governor releases every request's connections at request end, watches
//! the session catalog, and reclaims idle sessions in two tiers (periodic
//! TTL sweep, unconditional emergency sweep). Its only coordination
//! mechanism is repeated, idempotent, fail-safe snapshot-and-sweep; there
//! is no distributed lock and no leader.

mod catalog;
mod config;
mod lease;
mod middleware;
mod sweep;

pub use catalog::{
    CatalogError, ConnectionSnapshot, PgSessionCatalog, SessionCatalog, SessionInfo, SessionState,
};
pub use config::GovernorConfig;
pub use lease::{ConnectionLease, ReleaseGuard};
pub use middleware::{GovernorState, connection_governor_layer};
pub use sweep::Sweeper;
