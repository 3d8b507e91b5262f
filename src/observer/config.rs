//! Observer thresholds.

use std::time::Duration;

// Default values for observer configuration
const DEFAULT_DUPLICATE_REPETITION_THRESHOLD: usize = 3;
const DEFAULT_SLOW_QUERY_MS: u64 = 100;
const DEFAULT_QUERY_COUNT_WARNING: usize = 50;
const DEFAULT_QUERY_COUNT_CRITICAL: usize = 100;
const DEFAULT_SLOW_REQUEST_MS: u64 = 500;

/// Resolved query-cost observer configuration.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// A normalized pattern repeated strictly more often than this is
    /// reported as a likely N+1.
    pub duplicate_repetition_threshold: usize,
    /// Individual queries slower than this are reported.
    pub slow_query: Duration,
    /// Query count per request that logs a warning.
    pub query_count_warning: usize,
    /// Query count per request that logs at error severity.
    pub query_count_critical: usize,
    /// Total handler time that logs a slow-request warning.
    pub slow_request: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            duplicate_repetition_threshold: DEFAULT_DUPLICATE_REPETITION_THRESHOLD,
            slow_query: Duration::from_millis(DEFAULT_SLOW_QUERY_MS),
            query_count_warning: DEFAULT_QUERY_COUNT_WARNING,
            query_count_critical: DEFAULT_QUERY_COUNT_CRITICAL,
            slow_request: Duration::from_millis(DEFAULT_SLOW_REQUEST_MS),
        }
    }
}

impl From<&crate::config::ObserverSettings> for ObserverConfig {
    fn from(settings: &crate::config::ObserverSettings) -> Self {
        Self {
            duplicate_repetition_threshold: settings.duplicate_repetition_threshold,
            slow_query: settings.slow_query,
            query_count_warning: settings.query_count_warning,
            query_count_critical: settings.query_count_critical,
            slow_request: settings.slow_request,
        }
    }
}
