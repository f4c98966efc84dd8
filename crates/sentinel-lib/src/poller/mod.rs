//! Polling driver
//!
//! Fetches the baseline window once, then a recent window on every tick,
//! and feeds both to the statistics engine.

mod r#loop;

#[cfg(test)]
mod tests;

pub use r#loop::{DetectionLoop, DetectionLoopBuilder};

use crate::anomaly::{EngineError, UpdateSummary};
use crate::config::SentinelConfig;
use crate::models::Anomaly;
use crate::source::SourceError;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Why a cycle (or the initial baseline) was abandoned
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Result of one completed cycle
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub anomalies: Vec<Anomaly>,
    pub update: UpdateSummary,
}

/// Settings the driver needs from the configuration
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub metrics: Vec<String>,
    pub filters: HashMap<String, String>,
    pub baseline_days: u32,
    pub recent_minutes: u32,
    pub interval: Duration,
    pub z_score_threshold: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            metrics: Vec::new(),
            filters: HashMap::new(),
            baseline_days: crate::config::DEFAULT_BASELINE_DAYS,
            recent_minutes: 10,
            interval: Duration::from_secs(60),
            z_score_threshold: 3.0,
        }
    }
}

impl From<&SentinelConfig> for PollerConfig {
    fn from(config: &SentinelConfig) -> Self {
        Self {
            metrics: config.metrics.clone(),
            filters: config.filters.clone(),
            baseline_days: config.baseline_duration,
            recent_minutes: config.recent_duration,
            interval: config.polling_interval(),
            z_score_threshold: config.z_score_threshold,
        }
    }
}
