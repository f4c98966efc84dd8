//! Alertmanager webhook reporting
//!
//! Handles:
//! - Formatting anomalies as Alertmanager alerts
//! - Deduplication of alerts for the same metric within a configurable window
//! - Posting the alert batch to the Alertmanager v2 API

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::reporter::{AnomalyReporter, ReportError};
use crate::models::Anomaly;

/// Default deduplication window (15 minutes)
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 15 * 60;

/// Z-score magnitude from which an alert is critical
const CRITICAL_Z_SCORE: f64 = 5.0;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn for_z_score(z_score: f64) -> Self {
        if !z_score.is_finite() || z_score.abs() >= CRITICAL_Z_SCORE {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Alertmanager webhook alert format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerAlert {
    /// Alert labels for routing and grouping
    pub labels: HashMap<String, String>,
    /// Alert annotations with details
    pub annotations: HashMap<String, String>,
    /// Start time in RFC3339 format
    pub starts_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_url: Option<String>,
}

/// Posts anomalies to Alertmanager, suppressing repeats per metric
pub struct AlertmanagerReporter {
    client: reqwest::Client,
    /// Full URL of the alerts endpoint, e.g. `http://alertmanager:9093/api/v2/alerts`
    url: String,
    /// Value of the `project` label
    project_id: String,
    dedup_window: Duration,
    /// Metric id -> last emission time
    recent_alerts: RwLock<HashMap<String, Instant>>,
}

impl AlertmanagerReporter {
    /// Create a reporter with the default 15-minute deduplication window
    pub fn new(url: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            project_id: project_id.into(),
            dedup_window: Duration::from_secs(DEFAULT_DEDUP_WINDOW_SECS),
            recent_alerts: RwLock::new(HashMap::new()),
        }
    }

    /// Set custom deduplication window
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    /// Check if an alert for this metric should be suppressed
    pub fn should_suppress(&self, metric_id: &str) -> bool {
        let alerts = self.recent_alerts.read().unwrap_or_else(|e| e.into_inner());
        alerts
            .get(metric_id)
            .map(|last| last.elapsed() < self.dedup_window)
            .unwrap_or(false)
    }

    /// Record that an alert was emitted for this metric
    fn record_alert(&self, metric_id: &str) {
        let mut alerts = self.recent_alerts.write().unwrap_or_else(|e| e.into_inner());
        alerts.insert(metric_id.to_string(), Instant::now());

        // Clean up old entries
        alerts.retain(|_, time| time.elapsed() < self.dedup_window);
    }

    /// Build an Alertmanager alert for one anomaly
    pub fn create_alert(&self, anomaly: &Anomaly) -> AlertmanagerAlert {
        let severity = AlertSeverity::for_z_score(anomaly.z_score);

        let mut labels = HashMap::new();
        labels.insert("alertname".to_string(), "MetricZScoreAnomaly".to_string());
        labels.insert("severity".to_string(), severity.to_string());
        labels.insert("metric".to_string(), anomaly.metric_id.clone());
        labels.insert("project".to_string(), self.project_id.clone());

        let mut annotations = HashMap::new();
        annotations.insert(
            "summary".to_string(),
            format!("Anomaly detected on {}", anomaly.metric_id),
        );
        annotations.insert(
            "description".to_string(),
            format!(
                "Value {:.2} against baseline mean {:.2} (std-dev {:.2}). {}",
                anomaly.value, anomaly.baseline_mean, anomaly.baseline_std_dev, anomaly.message
            ),
        );
        annotations.insert("z_score".to_string(), format!("{:.2}", anomaly.z_score));

        AlertmanagerAlert {
            labels,
            annotations,
            starts_at: anomaly.timestamp.to_rfc3339(),
            ends_at: None,
            generator_url: None,
        }
    }

    /// Alerts for a cycle, at most one per metric and none for metrics
    /// alerted within the deduplication window.
    ///
    /// Nothing is recorded here; see [`mark_delivered`](Self::mark_delivered).
    pub fn collect_alerts(&self, anomalies: &[Anomaly]) -> Vec<AlertmanagerAlert> {
        let mut alerts = Vec::new();
        let mut seen = HashSet::new();

        for anomaly in anomalies {
            if !seen.insert(anomaly.metric_id.as_str()) {
                continue;
            }
            if self.should_suppress(&anomaly.metric_id) {
                debug!(metric = %anomaly.metric_id, "Suppressing duplicate alert");
                continue;
            }
            alerts.push(self.create_alert(anomaly));
        }

        alerts
    }

    /// Start the deduplication window for every metric in a delivered batch
    pub fn mark_delivered(&self, alerts: &[AlertmanagerAlert]) {
        for alert in alerts {
            if let Some(metric_id) = alert.labels.get("metric") {
                self.record_alert(metric_id);
            }
        }
    }
}

#[async_trait]
impl AnomalyReporter for AlertmanagerReporter {
    fn name(&self) -> &str {
        "alertmanager"
    }

    async fn report(&self, anomalies: &[Anomaly]) -> Result<(), ReportError> {
        let alerts = self.collect_alerts(anomalies);
        if alerts.is_empty() {
            return Ok(());
        }

        let response = self.client.post(&self.url).json(&alerts).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Rejected { status, body });
        }

        self.mark_delivered(&alerts);
        debug!(alerts = alerts.len(), "Posted alerts to Alertmanager");
        Ok(())
    }
}
