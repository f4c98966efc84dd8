//! Configuration CLI commands

use anyhow::Result;
use colored::Colorize;
use sentinel_lib::SentinelConfig;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_json, print_success, print_table, OutputFormat};

/// Row for the settings table
#[derive(Tabled, Serialize)]
struct SettingRow {
    #[tabled(rename = "Setting")]
    setting: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn setting(name: &str, value: impl ToString) -> SettingRow {
    SettingRow {
        setting: name.to_string(),
        value: value.to_string(),
    }
}

/// Print a validated configuration
pub fn validate(config: &SentinelConfig, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(config),
        OutputFormat::Table => {
            print_success("Configuration is valid");
            println!();

            let rows = vec![
                setting("Project", &config.project_id),
                setting("Endpoint", &config.endpoint),
                setting("Baseline window", format!("{} days", config.baseline_duration)),
                setting("Recent window", format!("{} minutes", config.recent_duration)),
                setting("Polling interval", format!("{}s", config.polling_time)),
                setting("Z-score threshold", config.z_score_threshold),
                setting("API port", config.api_port),
                setting(
                    "Alertmanager",
                    config.alertmanager_url.as_deref().unwrap_or("disabled"),
                ),
                setting(
                    "Access token",
                    if config.access_token.is_some() { "set" } else { "not set" },
                ),
            ];
            print_table(&rows, format);

            println!();
            println!("{}", "Monitored Metrics".bold());
            for metric in &config.metrics {
                match config.filters.get(metric) {
                    Some(filter) => println!("  {} {}", metric.cyan(), format!("[{}]", filter).dimmed()),
                    None => println!("  {}", metric.cyan()),
                }
            }
        }
    }

    Ok(())
}
