//! Z-score anomaly detection against per-metric baselines
//!
//! This module provides:
//! - Baseline and current-window statistics per metric
//! - The statistics engine that scores recent samples
//! - Reporting sinks for detected anomalies (console, log, Alertmanager)

mod alerter;
mod engine;
mod reporter;
mod stats;

pub use alerter::{AlertSeverity, AlertmanagerAlert, AlertmanagerReporter, DEFAULT_DEDUP_WINDOW_SECS};
pub use engine::{
    BaselineSummary, EngineError, EngineSnapshot, StatisticsEngine, UpdateSummary, ZScoreReport,
};
pub use reporter::{format_anomaly_line, AnomalyReporter, ConsoleReporter, LogReporter, ReportError};
pub use stats::{exceeds_threshold, BaselineStats, WindowSummary};
