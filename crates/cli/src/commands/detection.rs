//! Baseline and one-shot detection CLI commands

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use sentinel_lib::anomaly::{AlertSeverity, BaselineStats};
use sentinel_lib::poller::{DetectionLoop, DetectionLoopBuilder, PollerConfig};
use sentinel_lib::source::CloudMonitoringSource;
use sentinel_lib::{Anomaly, SentinelConfig, StructuredLogger};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::output::{
    color_z_score, format_stat, format_z_score, print_info, print_json, print_success,
    print_table, print_warning, OutputFormat,
};

/// Row for the baseline table
#[derive(Tabled, Serialize)]
struct BaselineRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Std Dev")]
    std_dev: String,
}

/// Row for the anomalies table
#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Z-Score")]
    z_score: String,
    #[tabled(rename = "Baseline")]
    baseline: String,
    #[tabled(rename = "Severity")]
    severity: String,
}

impl From<&Anomaly> for AnomalyRow {
    fn from(anomaly: &Anomaly) -> Self {
        Self {
            metric: anomaly.metric_id.clone(),
            timestamp: anomaly.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            value: format_stat(anomaly.value),
            z_score: color_z_score(anomaly.z_score),
            baseline: format!(
                "{} ± {}",
                format_stat(anomaly.baseline_mean),
                format_stat(anomaly.baseline_std_dev)
            ),
            severity: AlertSeverity::for_z_score(anomaly.z_score).to_string(),
        }
    }
}

#[derive(Serialize)]
struct BaselineOutput {
    baseline_days: u32,
    stats: BTreeMap<String, BaselineStats>,
    skipped: Vec<String>,
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    threshold: f64,
    anomalies: &'a [Anomaly],
    updated: &'a [String],
    empty: &'a [String],
    unknown: &'a [String],
    z_scores: BTreeMap<&'a str, f64>,
}

/// Build a detection loop against the configured backend, without reporters
fn build_detection(config: &SentinelConfig, threshold: Option<f64>) -> Result<DetectionLoop> {
    let source = CloudMonitoringSource::new(config.source_config())
        .context("Failed to create monitoring client")?;

    let mut poller_config = PollerConfig::from(config);
    if let Some(threshold) = threshold {
        if !threshold.is_finite() || threshold < 0.0 {
            anyhow::bail!("Threshold must be a finite non-negative number, got {}", threshold);
        }
        poller_config.z_score_threshold = threshold;
    }

    let (detection, _snapshots) = DetectionLoopBuilder::new()
        .source(Arc::new(source))
        .config(poller_config)
        .logger(StructuredLogger::new(&config.project_id))
        .build()?;

    Ok(detection)
}

/// Fetch the baseline window and print per-metric statistics
pub async fn show_baseline(config: &SentinelConfig, format: OutputFormat) -> Result<()> {
    let mut detection = build_detection(config, None)?;
    let summary = detection
        .initialize()
        .await
        .context("Failed to fetch baseline window")?;
    let snapshot = detection.engine().snapshot();

    match format {
        OutputFormat::Json => print_json(&BaselineOutput {
            baseline_days: config.baseline_duration,
            stats: snapshot.stats,
            skipped: summary.skipped,
        }),
        OutputFormat::Table => {
            println!(
                "{} (last {} days)",
                "Baseline Statistics".bold(),
                config.baseline_duration
            );
            println!("{}", "=".repeat(60));

            let rows: Vec<BaselineRow> = snapshot
                .stats
                .iter()
                .map(|(metric, stats)| BaselineRow {
                    metric: metric.clone(),
                    mean: format_stat(stats.baseline_mean),
                    std_dev: format_stat(stats.baseline_std_dev),
                })
                .collect();
            print_table(&rows, format);

            for metric in &summary.skipped {
                print_warning(&format!("No baseline data for {}", metric));
            }
        }
    }

    Ok(())
}

/// Initialize the baseline, run a single detection cycle and print anomalies
pub async fn run_check(
    config: &SentinelConfig,
    threshold: Option<f64>,
    verbose: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut detection = build_detection(config, threshold)?;
    let threshold = detection.config().z_score_threshold;

    detection
        .initialize()
        .await
        .context("Failed to fetch baseline window")?;

    let outcome = detection
        .run_cycle()
        .await
        .context("Detection cycle failed")?;
    let report = detection.engine().last_report();

    match format {
        OutputFormat::Json => print_json(&CheckOutput {
            threshold,
            anomalies: &outcome.anomalies,
            updated: &outcome.update.updated,
            empty: &outcome.update.empty,
            unknown: &outcome.update.unknown,
            z_scores: report.iter().collect(),
        }),
        OutputFormat::Table => {
            print_info(&format!(
                "Scored {} samples across {} metrics (threshold {})",
                report.len(),
                outcome.update.updated.len(),
                threshold
            ));
            for metric in &outcome.update.empty {
                print_warning(&format!("No recent samples for {}", metric));
            }
            for metric in &outcome.update.unknown {
                print_warning(&format!("No baseline for {}; samples ignored", metric));
            }

            if verbose {
                println!();
                println!("{}", "Z-Scores".bold());
                for (key, z_score) in report.iter() {
                    println!("  {:<60} {}", key, format_z_score(z_score));
                }
            }

            println!();
            if outcome.anomalies.is_empty() {
                print_success("No anomalies detected");
            } else {
                println!(
                    "{}",
                    format!("{} anomalies detected", outcome.anomalies.len())
                        .red()
                        .bold()
                );
                let rows: Vec<AnomalyRow> = outcome.anomalies.iter().map(AnomalyRow::from).collect();
                println!("{}", Table::new(&rows).with(Style::rounded()));
            }
        }
    }

    Ok(())
}
