//! Integration tests for the detection loop
//!
//! These tests verify:
//! - Baseline initialization through a metrics source
//! - Cycle behavior on success, empty windows and backend failures
//! - Reporting and snapshot publication

use super::*;
use crate::anomaly::{AnomalyReporter, ReportError};
use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::models::MetricSample;
use crate::source::MemorySource;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const LATENCY: &str = "custom.googleapis.com/latency";
const ERRORS: &str = "custom.googleapis.com/errors";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Reporter that records everything it receives
#[derive(Clone, Default)]
struct RecordingReporter {
    received: Arc<Mutex<Vec<Anomaly>>>,
    fail: bool,
}

#[async_trait]
impl AnomalyReporter for RecordingReporter {
    fn name(&self) -> &str {
        "recording"
    }

    async fn report(&self, anomalies: &[Anomaly]) -> Result<(), ReportError> {
        if self.fail {
            return Err(ReportError::Rejected {
                status: 500,
                body: "boom".to_string(),
            });
        }
        self.received.lock().unwrap().extend_from_slice(anomalies);
        Ok(())
    }
}

fn poller_config() -> PollerConfig {
    PollerConfig {
        metrics: vec![LATENCY.to_string(), ERRORS.to_string()],
        baseline_days: 7,
        recent_minutes: 10,
        interval: Duration::from_millis(20),
        z_score_threshold: 3.0,
        ..PollerConfig::default()
    }
}

/// Historical latency samples with mean 100 and std-dev 10; no error samples
fn seeded_source() -> Arc<MemorySource> {
    let source = MemorySource::new();
    for day in 1..=6 {
        let ts = now() - ChronoDuration::days(day);
        let value = if day % 2 == 0 { 90.0 } else { 110.0 };
        source.push(MetricSample::new(LATENCY, value, ts));
    }
    Arc::new(source)
}

fn build(
    source: Arc<MemorySource>,
    reporter: RecordingReporter,
    health: HealthRegistry,
) -> (DetectionLoop, tokio::sync::watch::Receiver<crate::anomaly::EngineSnapshot>) {
    DetectionLoopBuilder::new()
        .source(source)
        .reporter(Box::new(reporter))
        .config(poller_config())
        .health(health)
        .build()
        .unwrap()
}

mod initialization_tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_computes_baseline_and_skips_empty_metrics() {
        let health = HealthRegistry::new();
        let (mut detection, snapshots) =
            build(seeded_source(), RecordingReporter::default(), health.clone());

        let summary = detection.initialize_at(now()).await.unwrap();

        assert_eq!(summary.initialized, vec![LATENCY.to_string()]);
        assert_eq!(summary.skipped, vec![ERRORS.to_string()]);

        let stats = detection.engine().stats(LATENCY).unwrap();
        assert_eq!(stats.baseline_mean, 100.0);
        assert_eq!(stats.baseline_std_dev, 10.0);

        assert!(health.readiness().await.ready);
        assert!(snapshots.borrow().initialized);
    }

    #[tokio::test]
    async fn test_initialize_failure_leaves_engine_uninitialized() {
        let source = seeded_source();
        source.set_failing(true);
        let health = HealthRegistry::new();
        let (mut detection, _snapshots) =
            build(source, RecordingReporter::default(), health.clone());

        let result = detection.initialize_at(now()).await;

        assert!(matches!(result, Err(CycleError::Source(_))));
        assert!(!detection.engine().is_initialized());
        assert!(!health.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_cycle_before_initialize_is_contract_violation() {
        let (mut detection, _snapshots) =
            build(seeded_source(), RecordingReporter::default(), HealthRegistry::new());

        let result = detection.run_cycle_at(now()).await;

        assert!(matches!(
            result,
            Err(CycleError::Engine(crate::anomaly::EngineError::NotInitialized))
        ));
    }
}

mod cycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_cycle_reports_anomalies() {
        let source = seeded_source();
        let reporter = RecordingReporter::default();
        let (mut detection, snapshots) =
            build(source.clone(), reporter.clone(), HealthRegistry::new());
        detection.initialize_at(now()).await.unwrap();

        source.extend([
            MetricSample::new(LATENCY, 105.0, now() - ChronoDuration::minutes(3)),
            MetricSample::new(LATENCY, 131.0, now() - ChronoDuration::minutes(2)),
            MetricSample::new(ERRORS, 1.0, now() - ChronoDuration::minutes(2)),
        ]);

        let outcome = detection.run_cycle_at(now()).await.unwrap();

        assert_eq!(outcome.anomalies.len(), 1);
        assert_eq!(outcome.anomalies[0].value, 131.0);
        assert_eq!(outcome.update.updated, vec![LATENCY.to_string()]);
        assert_eq!(outcome.update.unknown, vec![ERRORS.to_string()]);

        let stats = detection.engine().stats(LATENCY).unwrap();
        assert_eq!(stats.current_mean, 118.0);

        assert_eq!(reporter.received.lock().unwrap().len(), 1);
        assert_eq!(snapshots.borrow().last_anomaly_count, 1);
        assert_eq!(detection.cycles(), 1);
    }

    #[tokio::test]
    async fn test_backend_failure_skips_cycle_without_touching_state() {
        let source = seeded_source();
        let health = HealthRegistry::new();
        health.register_all().await;
        let (mut detection, _snapshots) =
            build(source.clone(), RecordingReporter::default(), health.clone());
        detection.initialize_at(now()).await.unwrap();

        source.push(MetricSample::new(LATENCY, 50.0, now() - ChronoDuration::minutes(1)));
        detection.run_cycle_at(now()).await.unwrap();
        let before = *detection.engine().stats(LATENCY).unwrap();

        source.set_failing(true);
        let result = detection.run_cycle_at(now()).await;

        assert!(matches!(result, Err(CycleError::Source(_))));
        assert_eq!(*detection.engine().stats(LATENCY).unwrap(), before);
        let health_status = health.health().await;
        assert_eq!(
            health_status.components[components::METRICS_SOURCE].status,
            ComponentStatus::Degraded
        );

        // The next cycle proceeds normally once the backend recovers
        source.set_failing(false);
        assert!(detection.run_cycle_at(now()).await.is_ok());
        assert_eq!(
            health.health().await.components[components::METRICS_SOURCE].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_empty_recent_window_keeps_current_stats() {
        let source = seeded_source();
        let (mut detection, _snapshots) =
            build(source.clone(), RecordingReporter::default(), HealthRegistry::new());
        detection.initialize_at(now()).await.unwrap();

        source.push(MetricSample::new(LATENCY, 104.0, now() - ChronoDuration::minutes(1)));
        detection.run_cycle_at(now()).await.unwrap();

        // An hour later the recent window is empty
        let outcome = detection
            .run_cycle_at(now() + ChronoDuration::hours(1))
            .await
            .unwrap();

        assert_eq!(outcome.update.empty, vec![LATENCY.to_string()]);
        assert!(outcome.anomalies.is_empty());
        assert_eq!(detection.engine().stats(LATENCY).unwrap().current_mean, 104.0);
    }

    #[tokio::test]
    async fn test_reporter_failure_degrades_reporter_only() {
        let source = seeded_source();
        let health = HealthRegistry::new();
        health.register_all().await;
        let failing = RecordingReporter {
            fail: true,
            ..RecordingReporter::default()
        };
        let (mut detection, _snapshots) = build(source.clone(), failing, health.clone());
        detection.initialize_at(now()).await.unwrap();

        source.push(MetricSample::new(LATENCY, 500.0, now() - ChronoDuration::minutes(1)));
        let outcome = detection.run_cycle_at(now()).await.unwrap();

        assert_eq!(outcome.anomalies.len(), 1);
        let status = health.health().await;
        assert_eq!(
            status.components[components::REPORTER].status,
            ComponentStatus::Degraded
        );
        assert!(health.readiness().await.ready);
    }
}

mod builder_tests {
    use super::*;

    #[test]
    fn test_builder_requires_source() {
        let result = DetectionLoopBuilder::new().config(poller_config()).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_requires_metrics() {
        let result = DetectionLoopBuilder::new()
            .source(Arc::new(MemorySource::new()))
            .config(PollerConfig::default())
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let source = seeded_source();
        let (mut detection, _snapshots) =
            build(source.clone(), RecordingReporter::default(), HealthRegistry::new());
        detection.initialize().await.unwrap();
        let queries_after_init = source.query_count();

        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
        let handle = tokio::spawn(detection.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(70)).await;
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop")
            .unwrap();

        // At least the immediate first tick ran, fetching both metrics
        assert!(source.query_count() >= queries_after_init + 2);
    }
}
