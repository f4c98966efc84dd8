//! Baseline statistics engine
//!
//! Owns the per-metric statistics, computes the historical baseline once at
//! startup, refreshes current-window statistics every cycle and scores recent
//! samples against the baseline with a z-score test.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::stats::{BaselineStats, WindowSummary};
use crate::models::{Anomaly, MetricSeries};

/// Errors raised by the engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("baseline not initialised")]
    NotInitialized,
}

/// Outcome of a baseline initialization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BaselineSummary {
    /// Metrics that received a baseline
    pub initialized: Vec<String>,
    /// Metrics skipped for lack of data
    pub skipped: Vec<String>,
}

/// Outcome of a current-window update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub updated: Vec<String>,
    /// Known metrics with no samples in this window; left untouched
    pub empty: Vec<String>,
    /// Metrics without a baseline entry; rejected
    pub unknown: Vec<String>,
}

/// Z-scores computed during the latest detection call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZScoreReport {
    scores: BTreeMap<String, f64>,
}

impl ZScoreReport {
    /// Report key for a sample: `"<metric> at <timestamp>"`
    pub fn key(metric_id: &str, timestamp: &DateTime<Utc>) -> String {
        format!("{} at {}", metric_id, timestamp)
    }

    fn record(&mut self, metric_id: &str, timestamp: &DateTime<Utc>, z_score: f64) {
        self.scores.insert(Self::key(metric_id, timestamp), z_score);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.scores.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scores.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Read-only copy of engine state for consumers outside the cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub initialized: bool,
    pub stats: BTreeMap<String, BaselineStats>,
    pub last_report: ZScoreReport,
    pub last_anomaly_count: usize,
    pub taken_at: Option<DateTime<Utc>>,
}

/// Per-metric baseline statistics and the z-score detector built on them
///
/// The engine has a single owner; callers that need concurrent access should
/// wrap it in one lock or read [`EngineSnapshot`]s instead.
#[derive(Debug, Default)]
pub struct StatisticsEngine {
    stats: HashMap<String, BaselineStats>,
    initialized: bool,
    last_report: ZScoreReport,
    last_anomaly_count: usize,
}

impl StatisticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Statistics for one metric, if it has a baseline
    pub fn stats(&self, metric_id: &str) -> Option<&BaselineStats> {
        self.stats.get(metric_id)
    }

    /// Number of metrics with a baseline
    pub fn metric_count(&self) -> usize {
        self.stats.len()
    }

    /// Z-scores from the most recent detection call
    pub fn last_report(&self) -> &ZScoreReport {
        &self.last_report
    }

    /// Compute the baseline for every series, replacing all existing entries.
    ///
    /// Series with no samples get no entry. The engine counts as initialized
    /// afterwards even if every series was skipped.
    pub fn initialize_baseline(&mut self, series: &[MetricSeries]) -> BaselineSummary {
        info!(metrics = series.len(), "Initialising baseline");

        let mut stats = HashMap::with_capacity(series.len());
        let mut summary = BaselineSummary::default();

        for s in series {
            let Some(window) = WindowSummary::from_values(s.values()) else {
                warn!(metric = %s.metric_id, "No data points for metric, skipping baseline");
                summary.skipped.push(s.metric_id.clone());
                continue;
            };

            info!(
                metric = %s.metric_id,
                mean = window.mean,
                std_dev = window.std_dev,
                samples = window.count,
                "Baseline computed"
            );
            stats.insert(s.metric_id.clone(), BaselineStats::from_baseline(window));
            summary.initialized.push(s.metric_id.clone());
        }

        self.stats = stats;
        self.initialized = true;
        info!(
            initialized = summary.initialized.len(),
            skipped = summary.skipped.len(),
            "Baseline initialised"
        );

        summary
    }

    /// Refresh current-window statistics from the latest recent window.
    ///
    /// Empty series leave the stored values untouched. Metrics without a
    /// baseline entry are rejected and reported in the summary.
    pub fn update_current_window(&mut self, series: &[MetricSeries]) -> UpdateSummary {
        let mut summary = UpdateSummary::default();

        for s in series {
            let Some(entry) = self.stats.get_mut(&s.metric_id) else {
                warn!(metric = %s.metric_id, "No baseline for metric, ignoring current window");
                summary.unknown.push(s.metric_id.clone());
                continue;
            };

            match WindowSummary::from_values(s.values()) {
                Some(window) => {
                    entry.set_current(window);
                    debug!(
                        metric = %s.metric_id,
                        current_mean = window.mean,
                        current_std_dev = window.std_dev,
                        "Current window statistics updated"
                    );
                    summary.updated.push(s.metric_id.clone());
                }
                None => {
                    info!(metric = %s.metric_id, "No data points in current window, keeping previous statistics");
                    summary.empty.push(s.metric_id.clone());
                }
            }
        }

        summary
    }

    /// Score every sample against its metric's baseline.
    ///
    /// A sample is anomalous when `|z| > threshold`, or on a zero-variance
    /// baseline when it differs from the mean at all. Anomalies come back in
    /// series order, then sample order.
    pub fn detect_anomalies(
        &mut self,
        series: &[MetricSeries],
        threshold: f64,
    ) -> Result<Vec<Anomaly>, EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }

        let mut report = ZScoreReport::default();
        let mut anomalies = Vec::new();

        for s in series {
            let Some(stats) = self.stats.get(&s.metric_id) else {
                debug!(metric = %s.metric_id, "No baseline stats for metric, skipping detection");
                continue;
            };

            for sample in &s.samples {
                let z_score = stats.z_score(sample.value);
                report.record(&s.metric_id, &sample.timestamp, z_score);

                if stats.is_anomalous(sample.value, threshold) {
                    anomalies.push(Anomaly {
                        metric_id: s.metric_id.clone(),
                        value: sample.value,
                        timestamp: sample.timestamp,
                        message: format!(
                            "Value deviates significantly from the mean (Z-score: {:.2})",
                            z_score
                        ),
                        z_score,
                        baseline_mean: stats.baseline_mean,
                        baseline_std_dev: stats.baseline_std_dev,
                    });
                }
            }
        }

        for (key, z_score) in report.iter() {
            debug!(sample = %key, z_score = z_score, "Z-score");
        }
        info!(anomalies = anomalies.len(), scored = report.len(), "Detection complete");

        self.last_report = report;
        self.last_anomaly_count = anomalies.len();
        Ok(anomalies)
    }

    /// Copy of the current state for read-only consumers
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            initialized: self.initialized,
            stats: self
                .stats
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            last_report: self.last_report.clone(),
            last_anomaly_count: self.last_anomaly_count,
            taken_at: Some(Utc::now()),
        }
    }
}
