//! Core data models for the sentinel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single observed value of a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub metric_id: String,
    pub value: f64,
    /// End of the sampling interval the value applies to
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    pub fn new(metric_id: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            metric_id: metric_id.into(),
            value,
            timestamp,
        }
    }
}

/// All samples of one metric for one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub metric_id: String,
    pub samples: Vec<MetricSample>,
}

impl MetricSeries {
    pub fn new(metric_id: impl Into<String>, samples: Vec<MetricSample>) -> Self {
        Self {
            metric_id: metric_id.into(),
            samples,
        }
    }

    /// Series with no samples, used when a fetch came back empty
    pub fn empty(metric_id: impl Into<String>) -> Self {
        Self::new(metric_id, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + Clone + '_ {
        self.samples.iter().map(|s| s.value)
    }
}

/// Group loose samples into series, keeping first-appearance order of metric ids
pub fn group_by_metric(samples: impl IntoIterator<Item = MetricSample>) -> Vec<MetricSeries> {
    let mut series: Vec<MetricSeries> = Vec::new();

    for sample in samples {
        match series.iter_mut().find(|s| s.metric_id == sample.metric_id) {
            Some(existing) => existing.samples.push(sample),
            None => series.push(MetricSeries::new(sample.metric_id.clone(), vec![sample])),
        }
    }

    series
}

/// A sample flagged by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub metric_id: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub z_score: f64,
    pub baseline_mean: f64,
    pub baseline_std_dev: f64,
}
