//! Integration tests for the sentinel API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use sentinel::api::{create_router, AppState};
use sentinel_lib::{
    health::{components, HealthRegistry},
    observability::SentinelMetrics,
    poller::{DetectionLoop, DetectionLoopBuilder, PollerConfig},
    source::MemorySource,
    MetricSample,
};
use std::sync::Arc;
use tower::ServiceExt;

const METRIC: &str = "custom.googleapis.com/queue_depth";

async fn setup_test_app() -> (Router, Arc<AppState>, DetectionLoop) {
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let now = Utc::now();
    let source = MemorySource::with_samples(vec![
        MetricSample::new(METRIC, 10.0, now - Duration::days(2)),
        MetricSample::new(METRIC, 20.0, now - Duration::days(1)),
    ]);

    let (detection, snapshots) = DetectionLoopBuilder::new()
        .source(Arc::new(source))
        .config(PollerConfig {
            metrics: vec![METRIC.to_string()],
            ..PollerConfig::default()
        })
        .health(health_registry.clone())
        .build()
        .unwrap();

    let state = Arc::new(AppState::new(
        health_registry,
        SentinelMetrics::new(),
        snapshots,
    ));
    let router = create_router(state.clone());

    (router, state, detection)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state, _detection) = setup_test_app().await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"][components::METRICS_SOURCE].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state, _detection) = setup_test_app().await;

    state
        .health_registry
        .set_degraded(components::METRICS_SOURCE, "request timed out")
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    // Degraded still returns 200 (operational)
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state, _detection) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::ENGINE, "baseline not initialised")
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_before_baseline() {
    let (app, _state, _detection) = setup_test_app().await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_after_baseline() {
    let (app, _state, mut detection) = setup_test_app().await;

    detection.initialize().await.unwrap();

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_stats_reflects_engine_snapshot() {
    let (app, _state, mut detection) = setup_test_app().await;

    let (_, before) = get_json(app.clone(), "/stats").await;
    assert_eq!(before["initialized"], false);

    detection.initialize().await.unwrap();

    let (status, after) = get_json(app, "/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(after["initialized"], true);
    assert_eq!(after["stats"][METRIC]["baseline_mean"], 15.0);
    assert_eq!(after["stats"][METRIC]["baseline_std_dev"], 5.0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _state, _detection) = setup_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_str = String::from_utf8(body.to_vec()).unwrap();

    assert!(body_str.contains("baseline_sentinel_"));
}
