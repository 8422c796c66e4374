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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "storefront_cache_hit_total",
            Unit::Count,
            "Read-through lookups served from the cache store."
        );
        describe_counter!(
            "storefront_cache_miss_total",
            Unit::Count,
            "Read-through lookups that called the origin."
        );
        describe_counter!(
            "storefront_cache_bypass_total",
            Unit::Count,
            "Reads that skipped the cache (admin scope or unserializable key)."
        );
        describe_counter!(
            "storefront_cache_write_failure_total",
            Unit::Count,
            "Computed values that could not be written to the cache store."
        );
        describe_counter!(
            "storefront_cache_store_error_total",
            Unit::Count,
            "Cache store operations that failed or timed out."
        );
        describe_counter!(
            "storefront_cache_memory_evict_total",
            Unit::Count,
            "In-memory cache entries evicted due to capacity."
        );
        describe_counter!(
            "storefront_cache_invalidation_total",
            Unit::Count,
            "Invalidation runs executed after mutations or operator purges."
        );
        describe_counter!(
            "storefront_cache_invalidation_failure_total",
            Unit::Count,
            "Prefixes or keys an invalidation run failed to delete; each stays stale until its TTL."
        );
        describe_histogram!(
            "storefront_cache_invalidation_ms",
            Unit::Milliseconds,
            "Invalidation latency in milliseconds."
        );
        describe_counter!(
            "storefront_rate_limit_denied_total",
            Unit::Count,
            "Requests rejected by the rate guard."
        );
    });
}
