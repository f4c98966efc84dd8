//! Metrics sources
//!
//! A metrics source answers "give me the samples of metric X between start
//! and end, optionally filtered". The engine never talks to a backend
//! directly; the poller fetches windows through this trait.

mod cloud_monitoring;
mod memory;

pub use cloud_monitoring::{CloudMonitoringSource, SourceConfig, DEFAULT_ENDPOINT};
pub use memory::MemorySource;

use crate::models::{MetricSample, MetricSeries};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while fetching samples from a backend
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to metrics backend failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("metrics backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid metrics backend response: {0}")]
    Decode(String),
    #[error("invalid metrics query: {0}")]
    Query(String),
    #[error("metrics backend unavailable: {0}")]
    Unavailable(String),
}

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window covering the `days` days before `end`
    pub fn trailing_days(days: u32, end: DateTime<Utc>) -> Self {
        Self::new(end - Duration::days(i64::from(days)), end)
    }

    /// Window covering the `minutes` minutes before `end`
    pub fn trailing_minutes(minutes: u32, end: DateTime<Utc>) -> Self {
        Self::new(end - Duration::minutes(i64::from(minutes)), end)
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        *timestamp >= self.start && *timestamp < self.end
    }
}

/// A request for the samples of one metric over one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesQuery {
    pub metric_id: String,
    pub filter: Option<String>,
    pub window: TimeWindow,
}

impl SeriesQuery {
    pub fn new(metric_id: impl Into<String>, filter: Option<String>, window: TimeWindow) -> Self {
        Self {
            metric_id: metric_id.into(),
            filter,
            window,
        }
    }

    /// Backend filter: the metric type, ANDed with the extra filter if any
    pub fn filter_expression(&self) -> String {
        let base = format!("metric.type=\"{}\"", self.metric_id);
        match self.filter.as_deref().map(str::trim) {
            Some(extra) if !extra.is_empty() => format!("{} AND {}", base, extra),
            _ => base,
        }
    }
}

/// Trait for metrics backend implementations
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetch every sample matching the query. Order is unspecified.
    async fn list_series(&self, query: &SeriesQuery) -> Result<Vec<MetricSample>, SourceError>;
}

/// Fetch one series per metric for the given window.
///
/// Metrics are fetched in order; the first failure aborts the whole batch.
/// A metric with no samples still yields an (empty) series.
pub async fn fetch_window(
    source: &dyn MetricsSource,
    metrics: &[String],
    filters: &HashMap<String, String>,
    window: TimeWindow,
) -> Result<Vec<MetricSeries>, SourceError> {
    let mut batch = Vec::with_capacity(metrics.len());

    for metric_id in metrics {
        let query = SeriesQuery::new(metric_id.clone(), filters.get(metric_id).cloned(), window);
        tracing::debug!(metric = %metric_id, filter = %query.filter_expression(), "Fetching series");

        let samples = source.list_series(&query).await.map_err(|e| {
            tracing::warn!(metric = %metric_id, error = %e, "Failed to fetch series");
            e
        })?;
        batch.push(MetricSeries::new(metric_id.clone(), samples));
    }

    Ok(batch)
}
