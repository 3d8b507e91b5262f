//! Tiered HTTP response cache.
//!
//! Protects the backend from redundant work by serving repeated GET
//! requests from a key -> entry store with TTL expiry:
//!
//! - **Rule table**: ordered path-pattern tiers deciding bypass vs. TTL
//! - **Key builder**: deterministic `page:<path>...` key composition
//! - **Store**: LRU with per-entry TTL behind a fallible trait seam
//! - **Stage**: axum middleware orchestrating lookup, delegate, insert
//!
//! Staleness within a TTL window is accepted by design; there is no
//! cross-process invalidation protocol.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! response_limit = 512
//! default_ttl_seconds = 120
//! bypass = ["/admin/", "/login/", "/logout/"]
//! medium_paths = ["-list/", "/reports/"]
//! # ... see config.rs for all options
//! ```

mod config;
mod keys;
mod middleware;
mod rules;
mod store;

pub use config::{CacheConfig, TierConfig};
pub use keys::build_key;
pub use middleware::{CACHE_STATUS_HEADER, CacheState, response_cache_layer};
pub use rules::{CachePolicy, RuleTable};
pub use store::{CacheEntry, LruResponseStore, ResponseStore, StoreError};
