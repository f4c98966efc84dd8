//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use sentinel_lib::anomaly::AlertSeverity;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(&items),
    }
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        println!("{}", json);
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a statistic with fixed precision
pub fn format_stat(value: f64) -> String {
    format!("{:.2}", value)
}

/// Format a z-score, spelling out the zero-variance infinities
pub fn format_z_score(z_score: f64) -> String {
    if z_score == f64::INFINITY {
        "+inf".to_string()
    } else if z_score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{:+.2}", z_score)
    }
}

/// Color a z-score by the alert severity it maps to
pub fn color_z_score(z_score: f64) -> String {
    let formatted = format_z_score(z_score);
    match AlertSeverity::for_z_score(z_score) {
        AlertSeverity::Critical => formatted.red().bold().to_string(),
        AlertSeverity::Warning => formatted.yellow().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_z_score() {
        assert_eq!(format_z_score(3.456), "+3.46");
        assert_eq!(format_z_score(-1.0), "-1.00");
        assert_eq!(format_z_score(f64::INFINITY), "+inf");
        assert_eq!(format_z_score(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_format_stat() {
        assert_eq!(format_stat(8.16496), "8.16");
    }
}
