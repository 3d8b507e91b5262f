//! Per-request query statistics.
//!
//! Built once from the drained query log at request end, read once to
//! decide logging severity and response headers, then discarded.

use std::collections::HashMap;
use std::time::Duration;

use super::config::ObserverConfig;
use super::log::QueryRecord;

/// Slow-query reports are capped to the first few offenders; a storm of
/// slow queries floods logs without adding signal.
pub const SLOW_QUERY_REPORT_LIMIT: usize = 5;

/// One query that exceeded the slow-query threshold.
#[derive(Debug, Clone)]
pub struct SlowQuery {
    pub sql: String,
    pub duration: Duration,
}

/// Aggregate view over one request's executed queries.
#[derive(Debug, Clone, Default)]
pub struct RequestQueryStats {
    pub executed: usize,
    pub total_duration: Duration,
    /// Occurrences per normalized pattern, flagged or not.
    pub duplicate_groups: HashMap<String, usize>,
    /// First `SLOW_QUERY_REPORT_LIMIT` queries over the slow threshold,
    /// in execution order.
    pub slow_queries: Vec<SlowQuery>,
}

impl RequestQueryStats {
    /// Aggregate the drained records of one request.
    pub fn from_records(records: &[QueryRecord], config: &ObserverConfig) -> Self {
        let mut stats = Self {
            executed: records.len(),
            ..Self::default()
        };

        for record in records {
            stats.total_duration += record.duration;
            *stats
                .duplicate_groups
                .entry(record.normalized.clone())
                .or_insert(0) += 1;

            if record.duration > config.slow_query
                && stats.slow_queries.len() < SLOW_QUERY_REPORT_LIMIT
            {
                stats.slow_queries.push(SlowQuery {
                    sql: record.sql.clone(),
                    duration: record.duration,
                });
            }
        }

        stats
    }

    /// Groups repeated strictly more often than the threshold: the likely
    /// N+1 patterns. A group hitting the threshold exactly is not flagged.
    pub fn flagged_duplicates(&self, threshold: usize) -> Vec<(&str, usize)> {
        let mut flagged: Vec<(&str, usize)> = self
            .duplicate_groups
            .iter()
            .filter(|&(_, &count)| count > threshold)
            .map(|(pattern, &count)| (pattern.as_str(), count))
            .collect();
        flagged.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        flagged
    }
}
