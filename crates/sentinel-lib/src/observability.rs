//! Observability infrastructure for the sentinel
//!
//! Provides:
//! - Prometheus metrics (cycle latency, anomalies, backend errors, baselined metrics)
//! - Structured JSON logging with tracing

use crate::models::Anomaly;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Default histogram buckets for cycle latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SentinelMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct SentinelMetricsInner {
    cycle_latency_seconds: Histogram,
    cycles_completed: IntCounter,
    cycles_skipped: IntCounter,
    anomalies_detected: IntCounter,
    backend_errors: IntCounter,
    report_errors: IntCounter,
    metrics_with_baseline: IntGauge,
    samples_scored: IntGauge,
}

impl SentinelMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "baseline_sentinel_cycle_latency_seconds",
                "Time spent fetching, scoring and reporting one polling cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            cycles_completed: register_int_counter!(
                "baseline_sentinel_cycles_completed_total",
                "Number of polling cycles that ran detection"
            )
            .expect("Failed to register cycles_completed"),

            cycles_skipped: register_int_counter!(
                "baseline_sentinel_cycles_skipped_total",
                "Number of polling cycles abandoned before detection"
            )
            .expect("Failed to register cycles_skipped"),

            anomalies_detected: register_int_counter!(
                "baseline_sentinel_anomalies_detected_total",
                "Total number of anomalous samples detected"
            )
            .expect("Failed to register anomalies_detected"),

            backend_errors: register_int_counter!(
                "baseline_sentinel_backend_errors_total",
                "Total number of failed metrics backend fetches"
            )
            .expect("Failed to register backend_errors"),

            report_errors: register_int_counter!(
                "baseline_sentinel_report_errors_total",
                "Total number of failed anomaly report deliveries"
            )
            .expect("Failed to register report_errors"),

            metrics_with_baseline: register_int_gauge!(
                "baseline_sentinel_metrics_with_baseline",
                "Number of metrics that have a baseline"
            )
            .expect("Failed to register metrics_with_baseline"),

            samples_scored: register_int_gauge!(
                "baseline_sentinel_samples_scored",
                "Number of samples scored in the latest cycle"
            )
            .expect("Failed to register samples_scored"),
        }
    }
}

/// Sentinel metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct SentinelMetrics {
    _private: (),
}

impl Default for SentinelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SentinelMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SentinelMetricsInner {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new)
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn inc_cycles_completed(&self) {
        self.inner().cycles_completed.inc();
    }

    pub fn inc_cycles_skipped(&self) {
        self.inner().cycles_skipped.inc();
    }

    pub fn add_anomalies_detected(&self, count: usize) {
        self.inner().anomalies_detected.inc_by(count as u64);
    }

    pub fn inc_backend_errors(&self) {
        self.inner().backend_errors.inc();
    }

    pub fn inc_report_errors(&self) {
        self.inner().report_errors.inc();
    }

    pub fn set_metrics_with_baseline(&self, count: usize) {
        self.inner().metrics_with_baseline.set(count as i64);
    }

    pub fn set_samples_scored(&self, count: usize) {
        self.inner().samples_scored.set(count as i64);
    }

    /// Total anomalies counted so far
    pub fn anomalies_detected(&self) -> u64 {
        self.inner().anomalies_detected.get()
    }

    /// Total backend errors counted so far
    pub fn backend_errors(&self) -> u64 {
        self.inner().backend_errors.get()
    }
}

/// Structured logger for sentinel events
///
/// Provides consistent JSON-formatted logging for baselines, anomalies
/// and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    project_id: String,
}

impl StructuredLogger {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }

    /// Log an anomaly detection event
    pub fn log_anomaly(&self, anomaly: &Anomaly) {
        warn!(
            event = "anomaly_detected",
            project = %self.project_id,
            metric = %anomaly.metric_id,
            timestamp = %anomaly.timestamp,
            value = anomaly.value,
            z_score = anomaly.z_score,
            baseline_mean = anomaly.baseline_mean,
            baseline_std_dev = anomaly.baseline_std_dev,
            "{}",
            anomaly.message
        );
    }

    /// Log the statistics of one metric after a cycle update
    pub fn log_metric_stats(
        &self,
        metric_id: &str,
        baseline_mean: f64,
        baseline_std_dev: f64,
        current_mean: f64,
        current_std_dev: f64,
    ) {
        info!(
            event = "metric_stats",
            project = %self.project_id,
            metric = %metric_id,
            baseline_mean = baseline_mean,
            baseline_std_dev = baseline_std_dev,
            current_mean = current_mean,
            current_std_dev = current_std_dev,
            "Metric statistics"
        );
    }

    /// Log the outcome of baseline initialization
    pub fn log_baseline(&self, initialized: usize, skipped: &[String], baseline_days: u32) {
        if skipped.is_empty() {
            info!(
                event = "baseline_initialized",
                project = %self.project_id,
                metrics = initialized,
                baseline_days = baseline_days,
                "Baseline initialised"
            );
        } else {
            warn!(
                event = "baseline_initialized",
                project = %self.project_id,
                metrics = initialized,
                skipped = ?skipped,
                baseline_days = baseline_days,
                "Baseline initialised, some metrics had no data"
            );
        }
    }

    /// Log a cycle abandoned before detection
    pub fn log_cycle_skipped(&self, cycle: u64, reason: &str) {
        warn!(
            event = "cycle_skipped",
            project = %self.project_id,
            cycle = cycle,
            reason = %reason,
            "Polling cycle skipped"
        );
    }

    /// Log a broken engine contract
    pub fn log_contract_violation(&self, details: &str) {
        error!(
            event = "contract_violation",
            project = %self.project_id,
            details = %details,
            "Detection invoked in an invalid state"
        );
    }

    /// Log sentinel startup
    pub fn log_startup(&self, version: &str, metrics: usize, threshold: f64) {
        info!(
            event = "sentinel_started",
            project = %self.project_id,
            version = %version,
            metrics = metrics,
            z_score_threshold = threshold,
            "Baseline sentinel started"
        );
    }

    /// Log sentinel shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "sentinel_shutdown",
            project = %self.project_id,
            reason = %reason,
            "Baseline sentinel shutting down"
        );
    }
}
