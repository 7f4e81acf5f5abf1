//! GoAhead - headless decision and orchestration service
//!
//! Builds the application from the environment, registers the periodic KPI
//! refresh, pushes metrics as JSON to stdout and drains in-flight agent runs
//! on Ctrl+C.
//!
//! # Usage
//! ```sh
//! KPI_REFRESH_INTERVAL_SECONDS=300 cargo run --bin goahead
//! ```

use anyhow::Result;
use goahead::application::system::Application;
use goahead::config::Config;
use goahead::infrastructure::observability::MetricsReporter;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("GoAhead {} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: Store={:?}, Products={:?}, Timeframes={}",
        config.persistence.backend,
        config.orchestrator.products,
        config.orchestrator.timeframes.len()
    );

    let app = Application::build(config.clone()).await?;
    let handle = app.start().await?;

    if config.observability.enabled {
        let reporter = MetricsReporter::new(
            handle.orchestrator.clone(),
            handle.metrics.clone(),
            config.observability.report_interval_secs,
        );
        tokio::spawn(async move {
            reporter.run().await;
        });
        info!(
            "Metrics reporter started (interval: {}s)",
            config.observability.report_interval_secs
        );
    } else {
        info!("Metrics reporting disabled.");
    }

    info!("Server running. Press Ctrl+C to shutdown.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    app.shutdown().await;
    Ok(())
}
