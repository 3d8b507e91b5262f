use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global tracing subscriber and register metric descriptions.
///
/// Called once at startup; a second call fails because the global
/// dispatcher is already set.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let format_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default())
        .with(format_layer)
        .try_init()
        .map_err(|err| InfraError::Telemetry(format!("install tracing subscriber: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "scudo_cache_hit_total",
            Unit::Count,
            "Total number of response-cache hits."
        );
        describe_counter!(
            "scudo_cache_miss_total",
            Unit::Count,
            "Total number of response-cache misses."
        );
        describe_counter!(
            "scudo_cache_store_error_total",
            Unit::Count,
            "Total number of swallowed cache-store failures."
        );
        describe_histogram!(
            "scudo_observer_queries",
            Unit::Count,
            "Queries executed per request."
        );
        describe_counter!(
            "scudo_observer_duplicate_flagged_total",
            Unit::Count,
            "Total number of flagged N+1 query patterns."
        );
        describe_counter!(
            "scudo_governor_terminated_total",
            Unit::Count,
            "Total number of terminated backend sessions, by sweep tier."
        );
        describe_histogram!(
            "scudo_governor_sweep_ms",
            Unit::Milliseconds,
            "Sweep latency in milliseconds, by sweep tier."
        );
    });
}
