//! REST client for Cloud-Monitoring-style `timeSeries.list` backends
//!
//! Issues `GET {endpoint}/v3/projects/{project}/timeSeries` with a filter and
//! an interval, follows `nextPageToken` until exhausted and flattens every
//! returned point into a [`MetricSample`].

use super::{MetricsSource, SeriesQuery, SourceError};
use crate::models::MetricSample;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Default monitoring API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://monitoring.googleapis.com";

/// Configuration for the backend client
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// API base URL (scheme + host, optional port)
    pub endpoint: String,
    /// Project whose time series are listed
    pub project_id: String,
    /// Pre-issued bearer token, sent as-is when present
    pub access_token: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl SourceConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            project_id: project_id.into(),
            access_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTimeSeriesResponse {
    #[serde(default)]
    time_series: Vec<TimeSeries>,
    #[serde(default)]
    next_page_token: String,
}

#[derive(Debug, Deserialize)]
struct TimeSeries {
    #[serde(default)]
    points: Vec<Point>,
}

#[derive(Debug, Deserialize)]
struct Point {
    interval: Interval,
    value: TypedValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Interval {
    end_time: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypedValue {
    double_value: Option<f64>,
    /// int64 values are encoded as JSON strings
    int64_value: Option<String>,
}

impl TypedValue {
    fn as_f64(&self) -> Option<f64> {
        if let Some(v) = self.double_value {
            return Some(v);
        }
        self.int64_value
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .map(|v| v as f64)
    }
}

/// Metrics source backed by the monitoring REST API
pub struct CloudMonitoringSource {
    client: reqwest::Client,
    series_url: Url,
    access_token: Option<String>,
}

impl CloudMonitoringSource {
    /// Create a client for the configured project
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        if config.project_id.trim().is_empty() {
            return Err(SourceError::Query("project id is empty".to_string()));
        }

        let mut series_url = Url::parse(&config.endpoint)
            .map_err(|e| SourceError::Query(format!("invalid endpoint {}: {}", config.endpoint, e)))?;
        series_url
            .path_segments_mut()
            .map_err(|_| SourceError::Query(format!("endpoint {} cannot be a base URL", config.endpoint)))?
            .pop_if_empty()
            .extend(["v3", "projects", config.project_id.as_str(), "timeSeries"]);

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        info!(url = %series_url, "Created monitoring client");

        Ok(Self {
            client,
            series_url,
            access_token: config.access_token,
        })
    }

    /// URL that time series are listed from
    pub fn series_url(&self) -> &Url {
        &self.series_url
    }

    async fn fetch_page(
        &self,
        query: &SeriesQuery,
        page_token: Option<&str>,
    ) -> Result<ListTimeSeriesResponse, SourceError> {
        let mut params = vec![
            ("filter", query.filter_expression()),
            ("interval.startTime", rfc3339(&query.window.start)),
            ("interval.endTime", rfc3339(&query.window.end)),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let mut request = self.client.get(self.series_url.clone()).query(&params);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status { status, body });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| SourceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MetricsSource for CloudMonitoringSource {
    async fn list_series(&self, query: &SeriesQuery) -> Result<Vec<MetricSample>, SourceError> {
        let mut samples = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.fetch_page(query, page_token.as_deref()).await?;
            pages += 1;

            for series in page.time_series {
                for point in series.points {
                    match point.value.as_f64() {
                        Some(value) => samples.push(MetricSample::new(
                            query.metric_id.clone(),
                            value,
                            point.interval.end_time,
                        )),
                        None => debug!(
                            metric = %query.metric_id,
                            timestamp = %point.interval.end_time,
                            "Skipping non-numeric point"
                        ),
                    }
                }
            }

            if page.next_page_token.is_empty() {
                break;
            }
            page_token = Some(page.next_page_token);
        }

        debug!(
            metric = %query.metric_id,
            samples = samples.len(),
            pages = pages,
            "Fetched time series"
        );
        Ok(samples)
    }
}

fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
