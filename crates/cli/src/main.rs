//! Baseline Sentinel CLI
//!
//! A command-line tool for validating configuration, inspecting baseline
//! statistics and running one-off anomaly checks against the metrics backend.

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{config, detection};
use sentinel_lib::SentinelConfig;

/// Baseline Sentinel CLI
#[derive(Parser)]
#[command(name = "sentinelctl")]
#[command(author, version, about = "CLI for Baseline Sentinel", long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file (defaults to ./config.yaml)
    #[arg(long, short, env = "SENTINEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration
    Validate,

    /// Fetch the baseline window and show per-metric statistics
    Baseline,

    /// Run a single detection cycle and show anomalies
    Check {
        /// Override the configured z-score threshold
        #[arg(long, short)]
        threshold: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings =
        SentinelConfig::load(cli.config.as_deref()).context("Configuration error")?;

    match cli.command {
        Commands::Validate => {
            config::validate(&settings, cli.format)?;
        }
        Commands::Baseline => {
            detection::show_baseline(&settings, cli.format).await?;
        }
        Commands::Check { threshold } => {
            detection::run_check(&settings, threshold, cli.verbose, cli.format).await?;
        }
    }

    Ok(())
}
