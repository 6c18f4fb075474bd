//! Logging and metrics initialization

use metrics::{describe_counter, describe_histogram};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the level chosen by `debug`.
pub fn init_tracing(debug: bool, json: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .compact(),
            )
            .init();
    }
}

/// Serve Prometheus metrics on `addr`
pub fn install_metrics_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;

    describe_counter!(
        "dispatcher_flushes_total",
        "Provider calls started by each dispatcher"
    );
    describe_counter!(
        "dispatcher_provider_failures_total",
        "Provider calls that ended in an error"
    );
    describe_counter!(
        "dispatcher_synthetic_results_total",
        "Zero results produced for addresses a provider left out"
    );
    describe_histogram!("dispatcher_batch_size", "Distinct addresses per provider call");

    tracing::info!("Metrics server started on http://{}/metrics", addr);
    Ok(())
}
