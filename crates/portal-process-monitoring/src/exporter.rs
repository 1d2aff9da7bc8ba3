//! Metrics exporter and metric descriptions.

use std::net::SocketAddr;

use portal_process_core::application::metrics::names;

/// Serve the global `metrics` recorder as a Prometheus scrape endpoint
#[cfg(feature = "prometheus")]
pub fn init_metrics_exporter(address: SocketAddr) -> anyhow::Result<()> {
    use anyhow::Context;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tracing::info;

    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!(%address, "Prometheus exporter listening");
    Ok(())
}

/// Without the `prometheus` feature metrics are dropped
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics_exporter(address: SocketAddr) -> anyhow::Result<()> {
    tracing::warn!(%address, "Built without the prometheus feature; metrics are not exported");
    Ok(())
}

/// Register help text for the executor metrics
pub fn describe_metrics() {
    metrics::describe_counter!(names::PROCESS_CLAIMS, "Processes claimed by an executor");
    metrics::describe_counter!(
        names::PROCESS_CLAIM_CONFLICTS,
        "Claims lost to a concurrent executor"
    );
    metrics::describe_counter!(
        names::PROCESS_STEPS_EXECUTED,
        "Process steps executed, by step type and resulting status"
    );
    metrics::describe_counter!(
        names::PROCESS_COMMIT_CONFLICTS,
        "Step results discarded because the lease was lost"
    );
    metrics::describe_histogram!(
        names::PROCESS_STEP_DURATION,
        metrics::Unit::Seconds,
        "Time spent in step handlers"
    );
}
