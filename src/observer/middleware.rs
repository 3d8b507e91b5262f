//! Query cost observer stage.
//!
//! Instruments the downstream handler with a fresh query log, classifies
//! the request's query cost at exit, and reports through structured logs
//! and response headers. Strictly observational: it never changes the
//! status code or body, and it never blocks a request.

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use metrics::{counter, histogram};
use tracing::{error, instrument, warn};

use super::{ObserverConfig, QueryLog, RequestQueryStats};

pub const QUERY_COUNT_HEADER: &str = "x-query-count";
pub const RESPONSE_TIME_HEADER: &str = "x-response-time";
pub const SLOW_QUERIES_HEADER: &str = "x-slow-queries";
pub const QUERY_DUPLICATES_HEADER: &str = "x-query-duplicates";

const METRIC_OBSERVER_QUERIES: &str = "scudo_observer_queries";
const METRIC_OBSERVER_DUPLICATE_FLAGGED_TOTAL: &str = "scudo_observer_duplicate_flagged_total";

/// Shared observer state for the middleware.
#[derive(Debug, Clone)]
pub struct ObserverState {
    pub config: ObserverConfig,
}

impl ObserverState {
    pub fn new(config: ObserverConfig) -> Self {
        Self { config }
    }
}

/// Query cost observer middleware.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn query_observer_layer(
    State(observer): State<ObserverState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let log = QueryLog::new();
    request.extensions_mut().insert(log.clone());
    let started_at = Instant::now();

    let mut response = next.run(request).await;

    let elapsed = started_at.elapsed();
    let elapsed_ms = elapsed.as_millis();
    let records = log.drain();
    let stats = RequestQueryStats::from_records(&records, &observer.config);
    let flagged = stats.flagged_duplicates(observer.config.duplicate_repetition_threshold);

    histogram!(METRIC_OBSERVER_QUERIES).record(stats.executed as f64);

    for (pattern, occurrences) in &flagged {
        counter!(METRIC_OBSERVER_DUPLICATE_FLAGGED_TOTAL).increment(1);
        warn!(
            method = %method,
            path = %path,
            pattern = %pattern,
            occurrences,
            "likely N+1 query pattern",
        );
    }

    for slow in &stats.slow_queries {
        warn!(
            method = %method,
            path = %path,
            sql = %slow.sql,
            duration_ms = slow.duration.as_millis() as u64,
            "slow query",
        );
    }

    if stats.executed >= observer.config.query_count_critical {
        error!(
            method = %method,
            path = %path,
            executed = stats.executed,
            total_query_ms = stats.total_duration.as_millis() as u64,
            elapsed_ms = elapsed_ms as u64,
            "query count critical",
        );
    } else if stats.executed >= observer.config.query_count_warning {
        warn!(
            method = %method,
            path = %path,
            executed = stats.executed,
            total_query_ms = stats.total_duration.as_millis() as u64,
            elapsed_ms = elapsed_ms as u64,
            "query count elevated",
        );
    }

    if elapsed >= observer.config.slow_request {
        warn!(
            method = %method,
            path = %path,
            executed = stats.executed,
            elapsed_ms = elapsed_ms as u64,
            "slow request",
        );
    }

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&stats.executed.to_string()) {
        headers.insert(QUERY_COUNT_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{elapsed_ms}ms")) {
        headers.insert(RESPONSE_TIME_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&stats.slow_queries.len().to_string()) {
        headers.insert(SLOW_QUERIES_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&flagged.len().to_string()) {
        headers.insert(QUERY_DUPLICATES_HEADER, value);
    }

    response
}
