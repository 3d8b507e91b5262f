//! Request-scoped query log.
//!
//! One `QueryLog` is created per request by the observer stage and threaded
//! to the handler through request extensions; the database layer appends a
//! record per executed query. The log is the explicit replacement for
//! driver-global query counters, so concurrent workers never share state.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{body::Body, http::Request};

use crate::util::lock::mutex_lock;

use super::normalize::normalize;

const SOURCE: &str = "observer::log";

/// One executed query, recorded in execution order.
#[derive(Debug, Clone)]
pub struct QueryRecord {
    pub sql: String,
    pub normalized: String,
    pub duration: Duration,
}

/// Ordered per-request list of executed queries.
///
/// Cheap to clone; clones share the same underlying list.
#[derive(Debug, Clone, Default)]
pub struct QueryLog {
    records: Arc<Mutex<Vec<QueryRecord>>>,
}

impl QueryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The query log attached to a request, if the observer stage ran.
    pub fn of(request: &Request<Body>) -> Option<QueryLog> {
        request.extensions().get::<QueryLog>().cloned()
    }

    /// Append one executed query.
    pub fn record(&self, sql: &str, duration: Duration) {
        let record = QueryRecord {
            sql: sql.to_string(),
            normalized: normalize(sql),
            duration,
        };
        mutex_lock(&self.records, SOURCE, "record").push(record);
    }

    /// Time a query future and record it under the given SQL text.
    pub async fn observe<T, F>(&self, sql: &str, query: F) -> T
    where
        F: Future<Output = T>,
    {
        let started_at = Instant::now();
        let output = query.await;
        self.record(sql, started_at.elapsed());
        output
    }

    /// Number of queries executed so far.
    pub fn executed(&self) -> usize {
        mutex_lock(&self.records, SOURCE, "executed").len()
    }

    /// Take every record, leaving the log empty. Called once at request end.
    pub fn drain(&self) -> Vec<QueryRecord> {
        std::mem::take(&mut *mutex_lock(&self.records, SOURCE, "drain"))
    }
}
