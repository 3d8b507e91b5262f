//! Per-request query-cost observation.
//!
//! Watches every query a request executes, groups structurally identical
//! statements to surface N+1 storms, reports slow queries and slow
//! requests, and annotates responses with cost headers. Detection never
//! affects the response itself.

mod config;
mod log;
mod middleware;
pub mod normalize;
mod stats;

pub use config::ObserverConfig;
pub use log::{QueryLog, QueryRecord};
pub use middleware::{
    ObserverState, QUERY_COUNT_HEADER, QUERY_DUPLICATES_HEADER, RESPONSE_TIME_HEADER,
    SLOW_QUERIES_HEADER, query_observer_layer,
};
pub use stats::{RequestQueryStats, SLOW_QUERY_REPORT_LIMIT, SlowQuery};
