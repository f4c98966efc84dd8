//! Detection loop
//!
//! Owns the statistics engine and drives it: one baseline initialization at
//! startup, then one fetch/update/detect/report cycle per tick. Cycles never
//! overlap; a slow cycle delays the next tick.

use super::{CycleError, CycleOutcome, PollerConfig};
use crate::anomaly::{AnomalyReporter, BaselineSummary, EngineError, EngineSnapshot, StatisticsEngine};
use crate::health::{components, HealthRegistry};
use crate::observability::{SentinelMetrics, StructuredLogger};
use crate::source::{fetch_window, MetricsSource, TimeWindow};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Polling driver around a single-owner [`StatisticsEngine`]
pub struct DetectionLoop {
    source: Arc<dyn MetricsSource>,
    engine: StatisticsEngine,
    reporters: Vec<Box<dyn AnomalyReporter>>,
    config: PollerConfig,
    health: HealthRegistry,
    metrics: SentinelMetrics,
    logger: StructuredLogger,
    snapshot_tx: watch::Sender<EngineSnapshot>,
    cycle: u64,
}

impl DetectionLoop {
    /// Create a new loop and the receiver for its engine snapshots
    pub fn new(
        source: Arc<dyn MetricsSource>,
        reporters: Vec<Box<dyn AnomalyReporter>>,
        config: PollerConfig,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> (Self, watch::Receiver<EngineSnapshot>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(EngineSnapshot::default());

        let loop_instance = Self {
            source,
            engine: StatisticsEngine::new(),
            reporters,
            config,
            health,
            metrics: SentinelMetrics::new(),
            logger,
            snapshot_tx,
            cycle: 0,
        };

        (loop_instance, snapshot_rx)
    }

    pub fn engine(&self) -> &StatisticsEngine {
        &self.engine
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Number of cycles attempted so far
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Fetch the baseline window ending now and initialize the engine
    pub async fn initialize(&mut self) -> Result<BaselineSummary, CycleError> {
        self.initialize_at(Utc::now()).await
    }

    /// Fetch the baseline window ending at `now` and initialize the engine.
    ///
    /// A backend failure here leaves the engine uninitialized.
    pub async fn initialize_at(&mut self, now: DateTime<Utc>) -> Result<BaselineSummary, CycleError> {
        let window = TimeWindow::trailing_days(self.config.baseline_days, now);
        info!(
            start = %window.start,
            end = %window.end,
            metrics = self.config.metrics.len(),
            "Fetching historical metrics"
        );

        let batch = match fetch_window(
            self.source.as_ref(),
            &self.config.metrics,
            &self.config.filters,
            window,
        )
        .await
        {
            Ok(batch) => batch,
            Err(e) => {
                self.metrics.inc_backend_errors();
                self.health
                    .set_unhealthy(components::METRICS_SOURCE, e.to_string())
                    .await;
                return Err(e.into());
            }
        };

        let summary = self.engine.initialize_baseline(&batch);
        self.logger.log_baseline(
            summary.initialized.len(),
            &summary.skipped,
            self.config.baseline_days,
        );
        self.metrics.set_metrics_with_baseline(self.engine.metric_count());

        self.health.set_healthy(components::METRICS_SOURCE).await;
        self.health.set_healthy(components::ENGINE).await;
        self.health.set_ready(true).await;
        self.publish_snapshot();

        Ok(summary)
    }

    /// Run one cycle over the recent window ending now
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle over the recent window ending at `now`.
    ///
    /// A failed fetch abandons the cycle without touching engine state.
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome, CycleError> {
        let start = Instant::now();
        self.cycle += 1;

        let window = TimeWindow::trailing_minutes(self.config.recent_minutes, now);
        debug!(cycle = self.cycle, start = %window.start, end = %window.end, "Fetching recent metrics");

        let batch = match fetch_window(
            self.source.as_ref(),
            &self.config.metrics,
            &self.config.filters,
            window,
        )
        .await
        {
            Ok(batch) => batch,
            Err(e) => {
                self.metrics.inc_backend_errors();
                self.metrics.inc_cycles_skipped();
                self.health
                    .set_degraded(components::METRICS_SOURCE, e.to_string())
                    .await;
                self.logger.log_cycle_skipped(self.cycle, &e.to_string());
                return Err(e.into());
            }
        };
        self.health.set_healthy(components::METRICS_SOURCE).await;

        let update = self.engine.update_current_window(&batch);
        for series in &batch {
            if let Some(stats) = self.engine.stats(&series.metric_id) {
                self.logger.log_metric_stats(
                    &series.metric_id,
                    stats.baseline_mean,
                    stats.baseline_std_dev,
                    stats.current_mean,
                    stats.current_std_dev,
                );
            }
        }

        let anomalies = match self
            .engine
            .detect_anomalies(&batch, self.config.z_score_threshold)
        {
            Ok(anomalies) => anomalies,
            Err(e @ EngineError::NotInitialized) => {
                self.metrics.inc_cycles_skipped();
                self.logger.log_contract_violation(&e.to_string());
                self.health
                    .set_unhealthy(components::ENGINE, e.to_string())
                    .await;
                return Err(e.into());
            }
        };

        self.metrics.add_anomalies_detected(anomalies.len());
        self.metrics.set_samples_scored(self.engine.last_report().len());

        if !anomalies.is_empty() {
            self.report(&anomalies).await;
        }

        self.metrics.inc_cycles_completed();
        self.metrics
            .observe_cycle_latency(start.elapsed().as_secs_f64());
        self.publish_snapshot();

        Ok(CycleOutcome { anomalies, update })
    }

    /// Hand anomalies to every reporter; delivery failures are logged only
    async fn report(&self, anomalies: &[crate::models::Anomaly]) {
        let mut failures = Vec::new();

        for reporter in &self.reporters {
            if let Err(e) = reporter.report(anomalies).await {
                warn!(reporter = reporter.name(), error = %e, "Failed to report anomalies");
                self.metrics.inc_report_errors();
                failures.push(format!("{}: {}", reporter.name(), e));
            }
        }

        if failures.is_empty() {
            self.health.set_healthy(components::REPORTER).await;
        } else {
            self.health
                .set_degraded(components::REPORTER, failures.join("; "))
                .await;
        }
    }

    fn publish_snapshot(&self) {
        // send_replace never fails, even without receivers
        self.snapshot_tx.send_replace(self.engine.snapshot());
    }

    /// Run cycles on every tick until shutdown.
    ///
    /// The first tick fires immediately. Expects [`initialize`](Self::initialize)
    /// to have succeeded; cycles before that are skipped as contract violations.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            threshold = self.config.z_score_threshold,
            "Starting detection loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(outcome) => debug!(
                            cycle = self.cycle,
                            anomalies = outcome.anomalies.len(),
                            updated = outcome.update.updated.len(),
                            "Cycle complete"
                        ),
                        Err(e) => debug!(cycle = self.cycle, error = %e, "Cycle abandoned"),
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down detection loop");
                    break;
                }
            }
        }
    }
}

/// Builder for creating the detection loop
pub struct DetectionLoopBuilder {
    source: Option<Arc<dyn MetricsSource>>,
    reporters: Vec<Box<dyn AnomalyReporter>>,
    config: Option<PollerConfig>,
    health: HealthRegistry,
    logger: Option<StructuredLogger>,
}

impl DetectionLoopBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            reporters: Vec::new(),
            config: None,
            health: HealthRegistry::new(),
            logger: None,
        }
    }

    pub fn source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Add a reporter; reporters run in the order they were added
    pub fn reporter(mut self, reporter: Box<dyn AnomalyReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn config(mut self, config: PollerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<(DetectionLoop, watch::Receiver<EngineSnapshot>)> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Metrics source is required"))?;
        let config = self
            .config
            .ok_or_else(|| anyhow::anyhow!("Poller config is required"))?;
        if config.metrics.is_empty() {
            anyhow::bail!("At least one metric is required");
        }
        if config.interval.is_zero() {
            anyhow::bail!("Polling interval must be greater than zero");
        }
        let logger = self
            .logger
            .unwrap_or_else(|| StructuredLogger::new("default"));

        Ok(DetectionLoop::new(
            source,
            self.reporters,
            config,
            self.health,
            logger,
        ))
    }
}

impl Default for DetectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
