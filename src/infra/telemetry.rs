use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
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
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "flagcast_cache_hit_total",
            Unit::Count,
            "Distribution reads answered from memory."
        );
        describe_counter!(
            "flagcast_cache_miss_total",
            Unit::Count,
            "Distribution reads that had to load from the database."
        );
        describe_counter!(
            "flagcast_cache_invalidate_total",
            Unit::Count,
            "Distribution entries dropped by management writes."
        );
        describe_gauge!(
            "flagcast_cache_entries",
            Unit::Count,
            "Applications currently held in the distribution cache."
        );
        describe_histogram!(
            "flagcast_cache_refresh_ms",
            Unit::Milliseconds,
            "Duration of full distribution reloads, labelled by reason."
        );
    });
}
