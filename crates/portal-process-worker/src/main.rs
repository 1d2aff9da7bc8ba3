use anyhow::{Context, Result};
use portal_process_monitoring::MonitoringConfig;
use portal_process_worker::WorkerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Set up monitoring
    let monitoring_config = MonitoringConfig::load("portal-process-worker");

    portal_process_monitoring::init(&monitoring_config)
        .context("Failed to initialize monitoring")?;

    // Load configuration from environment variables
    let config = WorkerConfig::load()
        .context("Failed to load configuration")?;

    portal_process_worker::run(config).await
        .context("Worker error")?;

    Ok(())
}
