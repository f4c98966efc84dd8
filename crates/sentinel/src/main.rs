//! Baseline Sentinel - z-score anomaly alerts on top of a metrics backend
//!
//! Computes a per-metric baseline from the historical window at startup,
//! then polls the recent window on a fixed interval and reports samples
//! that deviate from the baseline.

use anyhow::{Context, Result};
use clap::Parser;
use sentinel::api;
use sentinel_lib::{
    anomaly::{AlertmanagerReporter, ConsoleReporter, LogReporter},
    health::HealthRegistry,
    observability::{SentinelMetrics, StructuredLogger},
    poller::{DetectionLoopBuilder, PollerConfig},
    source::CloudMonitoringSource,
    SentinelConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SENTINEL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Baseline Sentinel daemon
#[derive(Parser)]
#[command(name = "baseline-sentinel", version, about = "Z-score anomaly alerts for monitored metrics")]
struct Args {
    /// Path to the YAML configuration file (defaults to ./config.yaml)
    #[arg(long, short, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let args = Args::parse();

    info!("Loading configuration");
    let config = SentinelConfig::load(args.config.as_deref()).context("Configuration error")?;

    let logger = StructuredLogger::new(&config.project_id);
    logger.log_startup(SENTINEL_VERSION, config.metrics.len(), config.z_score_threshold);

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;
    let metrics = SentinelMetrics::new();

    let source = CloudMonitoringSource::new(config.source_config())
        .context("Failed to create monitoring client")?;

    let mut builder = DetectionLoopBuilder::new()
        .source(Arc::new(source))
        .config(PollerConfig::from(&config))
        .health(health_registry.clone())
        .logger(logger.clone())
        .reporter(Box::new(ConsoleReporter::stdout()))
        .reporter(Box::new(LogReporter::new(logger.clone())));

    if let Some(url) = &config.alertmanager_url {
        info!(url = %url, "Alertmanager reporting enabled");
        builder = builder.reporter(Box::new(
            AlertmanagerReporter::new(url.clone(), config.project_id.clone())
                .with_dedup_window(config.dedup_window()),
        ));
    }

    let (mut detection, snapshots) = builder.build()?;

    // Serve health endpoints while the baseline is being fetched; readiness
    // flips once it is in place
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        snapshots,
    ));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    info!(days = config.baseline_duration, "Fetching historical metrics");
    detection
        .initialize()
        .await
        .context("Failed to initialise baseline")?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(detection.run(shutdown_rx));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(());
    loop_handle.await.context("Detection loop task failed")?;
    info!("Shutting down");

    Ok(())
}
