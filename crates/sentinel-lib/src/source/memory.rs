//! In-memory metrics source

use super::{MetricsSource, SeriesQuery, SourceError};
use crate::models::MetricSample;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Metrics source backed by a vector of samples
///
/// Answers queries by metric id and window membership. Filters are ignored.
/// Can be switched into a failing mode to simulate a backend outage.
#[derive(Debug, Default)]
pub struct MemorySource {
    samples: Mutex<Vec<MetricSample>>,
    failing: AtomicBool,
    queries: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_samples(samples: Vec<MetricSample>) -> Self {
        Self {
            samples: Mutex::new(samples),
            ..Self::default()
        }
    }

    pub fn push(&self, sample: MetricSample) {
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sample);
    }

    pub fn extend(&self, samples: impl IntoIterator<Item = MetricSample>) {
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(samples);
    }

    /// Make every subsequent query fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of queries answered or rejected so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsSource for MemorySource {
    async fn list_series(&self, query: &SeriesQuery) -> Result<Vec<MetricSample>, SourceError> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable(format!(
                "simulated outage while fetching {}",
                query.metric_id
            )));
        }

        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        Ok(samples
            .iter()
            .filter(|s| s.metric_id == query.metric_id && query.window.contains(&s.timestamp))
            .cloned()
            .collect())
    }
}
