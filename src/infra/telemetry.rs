use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    CACHE_ENTRIES, CACHE_EVICT_TOTAL, CACHE_FETCH_MS, CACHE_HIT_TOTAL, CACHE_MISS_TOTAL,
    CACHE_REFRESH_FAILED_TOTAL, CACHE_STALE_TOTAL, CACHE_SWEEP_TOTAL,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every cache metric. Safe to call repeatedly.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            CACHE_HIT_TOTAL,
            Unit::Count,
            "Reads answered from a fresh entry."
        );
        describe_counter!(
            CACHE_STALE_TOTAL,
            Unit::Count,
            "Reads answered from a stale entry while a refresh runs."
        );
        describe_counter!(
            CACHE_MISS_TOTAL,
            Unit::Count,
            "Reads that waited for an upstream fetch."
        );
        describe_counter!(
            CACHE_EVICT_TOTAL,
            Unit::Count,
            "Entries evicted because a domain exceeded its capacity."
        );
        describe_counter!(
            CACHE_SWEEP_TOTAL,
            Unit::Count,
            "Entries removed by the periodic sweep after their stale window."
        );
        describe_counter!(
            CACHE_REFRESH_FAILED_TOTAL,
            Unit::Count,
            "Fetches that failed, labelled by background or cold path."
        );
        describe_gauge!(
            CACHE_ENTRIES,
            Unit::Count,
            "Current number of entries held per domain."
        );
        describe_histogram!(
            CACHE_FETCH_MS,
            Unit::Milliseconds,
            "Upstream fetch latency in milliseconds."
        );
    });
}
