//! Vigil observability
//!
//! Tracing and metrics bootstrap shared by every binary.

pub mod metrics;

pub use metrics::init_prometheus_recorder;
pub use metrics_exporter_prometheus::PrometheusHandle;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise JSON logging (env-filtered) and the Prometheus recorder;
/// the returned handle renders the scrape payload for a /metrics route
pub fn init_observability() -> PrometheusHandle {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    init_prometheus_recorder()
}
