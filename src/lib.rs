//! Scudo protects a shared relational database behind a multi-tenant web
//! backend. Three middleware stages compose around the business handler:
//!
//! - [`governor`]: releases every request's connections and reclaims idle
//!   backend sessions, forcibly under pressure
//! - [`cache`]: tiered TTL response cache for repeated GET requests
//! - [`observer`]: per-request query counting, N+1 detection, and slow
//!   query reporting
//!
//! [`pipeline::apply_stages`] fixes the composition order; the stages are
//! otherwise independent, testable units.

pub mod cache;
pub mod config;
pub mod governor;
pub mod http;
pub mod identity;
pub mod infra;
pub mod observer;
pub mod pipeline;
pub(crate) mod util;
