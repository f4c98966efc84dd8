//! Per-metric baseline statistics
//!
//! Mean and population standard deviation are computed with a two-pass
//! algorithm over an already materialized window of values.

use serde::{Deserialize, Serialize};

/// Mean and population standard deviation of a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl WindowSummary {
    /// Summarize a window of values. Returns `None` for an empty window.
    pub fn from_values<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
        I::IntoIter: Clone,
    {
        let values = values.into_iter();

        let (sum, count) = values
            .clone()
            .fold((0.0_f64, 0usize), |(sum, count), v| (sum + v, count + 1));
        if count == 0 {
            return None;
        }
        let mean = sum / count as f64;

        // Divisor is the sample count, not count - 1
        let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Some(Self {
            mean,
            std_dev: variance.sqrt(),
            count,
        })
    }
}

/// Statistics tracked for one metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineStats {
    /// Mean of the historical window
    pub baseline_mean: f64,
    /// Population standard deviation of the historical window
    pub baseline_std_dev: f64,
    /// Mean of the latest recent window
    pub current_mean: f64,
    /// Population standard deviation of the latest recent window
    pub current_std_dev: f64,
}

impl BaselineStats {
    /// Fresh entry from a historical window; current stats start at zero
    pub fn from_baseline(summary: WindowSummary) -> Self {
        Self {
            baseline_mean: summary.mean,
            baseline_std_dev: summary.std_dev,
            current_mean: 0.0,
            current_std_dev: 0.0,
        }
    }

    /// Overwrite the current-window statistics
    pub fn set_current(&mut self, summary: WindowSummary) {
        self.current_mean = summary.mean;
        self.current_std_dev = summary.std_dev;
    }

    /// Whether the historical window had no variance at all
    pub fn is_zero_variance(&self) -> bool {
        self.baseline_std_dev == 0.0
    }

    /// Number of baseline standard deviations `value` lies from the baseline mean.
    ///
    /// A zero-variance baseline yields `0.0` for a value equal to the mean and
    /// a signed infinity for anything else.
    pub fn z_score(&self, value: f64) -> f64 {
        let deviation = value - self.baseline_mean;

        if self.is_zero_variance() {
            if deviation == 0.0 {
                0.0
            } else {
                f64::INFINITY.copysign(deviation)
            }
        } else {
            deviation / self.baseline_std_dev
        }
    }

    /// Whether `value` is anomalous against this baseline.
    ///
    /// On a zero-variance baseline any deviation is anomalous and an exact
    /// match never is, whatever the threshold.
    pub fn is_anomalous(&self, value: f64, threshold: f64) -> bool {
        if self.is_zero_variance() {
            return value != self.baseline_mean;
        }
        exceeds_threshold(self.z_score(value), threshold)
    }
}

/// Strict threshold test; non-finite scores exceed any threshold
pub fn exceeds_threshold(z_score: f64, threshold: f64) -> bool {
    !z_score.is_finite() || z_score.abs() > threshold
}
