//! Library for baseline z-score anomaly detection
//!
//! This crate provides the core functionality for:
//! - Per-metric baseline statistics and z-score anomaly detection
//! - Fetching metric windows from a monitoring backend
//! - The polling loop that drives detection
//! - Anomaly reporting, health checks and observability

pub mod anomaly;
pub mod config;
pub mod health;
pub mod models;
pub mod observability;
pub mod poller;
pub mod source;

pub use anomaly::{BaselineStats, EngineError, StatisticsEngine};
pub use config::{ConfigError, SentinelConfig};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SentinelMetrics, StructuredLogger};
pub use source::{MetricsSource, SourceError};
