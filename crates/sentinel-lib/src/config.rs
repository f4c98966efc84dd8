//! Sentinel configuration
//!
//! Loaded from a YAML file layered under `SENTINEL__*` environment variables,
//! then validated. Any failure here is fatal at startup.

use crate::source::{SourceConfig, DEFAULT_ENDPOINT};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Config file read when no explicit path is given
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Baseline window used when none (or zero) is configured
pub const DEFAULT_BASELINE_DAYS: u32 = 7;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Sentinel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelConfig {
    /// Metric ids to monitor
    pub metrics: Vec<String>,

    /// Extra filter expression per metric id
    #[serde(default)]
    pub filters: HashMap<String, String>,

    /// Baseline window in days
    #[serde(default = "default_baseline_duration")]
    pub baseline_duration: u32,

    /// Recent (detection) window in minutes
    pub recent_duration: u32,

    /// Polling interval in seconds
    pub polling_time: u64,

    /// Backend project to query
    pub project_id: String,

    /// Z-score magnitude above which a sample is anomalous
    #[serde(default = "default_z_score_threshold")]
    pub z_score_threshold: f64,

    /// Monitoring API base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token for the monitoring API
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Port for health/metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Alertmanager alerts endpoint; alerts are only posted when set
    #[serde(default)]
    pub alertmanager_url: Option<String>,

    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,
}

fn default_baseline_duration() -> u32 {
    DEFAULT_BASELINE_DAYS
}

fn default_z_score_threshold() -> f64 {
    3.0
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_api_port() -> u16 {
    8080
}

fn default_dedup_window() -> u64 {
    crate::anomaly::DEFAULT_DEDUP_WINDOW_SECS
}

impl SentinelConfig {
    /// Load configuration from a file and the environment.
    ///
    /// An explicit `path` must exist; without one, `config.yaml` in the
    /// working directory is read if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).format(FileFormat::Yaml).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE)
                .format(FileFormat::Yaml)
                .required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("SENTINEL")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("metrics")
                    .try_parsing(true),
            )
            .build()?;

        Self::finish(settings.try_deserialize()?)
    }

    /// Parse configuration from a YAML document, without environment overrides
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;

        Self::finish(settings.try_deserialize()?)
    }

    fn finish(mut config: Self) -> Result<Self, ConfigError> {
        if config.baseline_duration == 0 {
            config.baseline_duration = DEFAULT_BASELINE_DAYS;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that deserialization cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics.is_empty() {
            return invalid("at least one metric must be configured");
        }
        if let Some(blank) = self.metrics.iter().position(|m| m.trim().is_empty()) {
            return invalid(format!("metric #{} is blank", blank + 1));
        }
        if let Some(orphan) = self.filters.keys().find(|k| !self.metrics.contains(k)) {
            return invalid(format!("filter given for unmonitored metric {}", orphan));
        }
        if self.project_id.trim().is_empty() {
            return invalid("project_id must not be empty");
        }
        if self.polling_time == 0 {
            return invalid("polling_time must be greater than zero");
        }
        if self.recent_duration == 0 {
            return invalid("recent_duration must be greater than zero");
        }
        if !self.z_score_threshold.is_finite() || self.z_score_threshold < 0.0 {
            return invalid(format!(
                "z_score_threshold must be a finite non-negative number, got {}",
                self.z_score_threshold
            ));
        }
        if self.request_timeout_secs == 0 {
            return invalid("request_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_time)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }

    /// Backend client settings derived from this configuration
    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            endpoint: self.endpoint.clone(),
            project_id: self.project_id.clone(),
            access_token: self.access_token.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

fn invalid<T>(message: impl Into<String>) -> Result<T, ConfigError> {
    Err(ConfigError::Invalid(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
metrics:
  - compute.googleapis.com/instance/cpu/utilization
polling_time: 60
project_id: demo-project
recent_duration: 10
"#;

    #[test]
    fn test_defaults_applied() {
        let config = SentinelConfig::from_yaml_str(MINIMAL).unwrap();

        assert_eq!(config.baseline_duration, DEFAULT_BASELINE_DAYS);
        assert_eq!(config.z_score_threshold, 3.0);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.api_port, 8080);
        assert!(config.filters.is_empty());
        assert!(config.alertmanager_url.is_none());
        assert_eq!(config.polling_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_baseline_duration_means_default() {
        let yaml = format!("{}baseline_duration: 0\n", MINIMAL);
        let config = SentinelConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.baseline_duration, 7);
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
metrics:
  - custom.googleapis.com/latency
  - custom.googleapis.com/errors
filters:
  custom.googleapis.com/latency: resource.labels.zone="us-east1-b"
polling_time: 30
project_id: demo-project
baseline_duration: 14
recent_duration: 5
z_score_threshold: 2.5
"#;
        let config = SentinelConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.metrics.len(), 2);
        assert_eq!(config.baseline_duration, 14);
        assert_eq!(config.z_score_threshold, 2.5);
        assert_eq!(
            config.filters["custom.googleapis.com/latency"],
            "resource.labels.zone=\"us-east1-b\""
        );
    }

    #[test]
    fn test_missing_required_field() {
        let yaml = "metrics: [a]\npolling_time: 60\nrecent_duration: 10\n";
        assert!(matches!(
            SentinelConfig::from_yaml_str(yaml),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            "metrics: []\npolling_time: 60\nproject_id: p\nrecent_duration: 10\n",
            "metrics: [a]\npolling_time: 0\nproject_id: p\nrecent_duration: 10\n",
            "metrics: [a]\npolling_time: 60\nproject_id: p\nrecent_duration: 0\n",
            "metrics: [a]\npolling_time: 60\nproject_id: ' '\nrecent_duration: 10\n",
            "metrics: [a]\npolling_time: 60\nproject_id: p\nrecent_duration: 10\nz_score_threshold: -1\n",
            "metrics: [a]\npolling_time: 60\nproject_id: p\nrecent_duration: 10\nfilters:\n  b: x\n",
        ];

        for yaml in cases {
            assert!(
                matches!(SentinelConfig::from_yaml_str(yaml), Err(ConfigError::Invalid(_))),
                "expected invalid config for {:?}",
                yaml
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = SentinelConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.project_id, "demo-project");
        assert_eq!(config.recent_duration, 10);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = SentinelConfig::load(Some(Path::new("/nonexistent/sentinel.yaml")));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_source_config() {
        let config = SentinelConfig::from_yaml_str(MINIMAL).unwrap();
        let source = config.source_config();

        assert_eq!(source.project_id, "demo-project");
        assert_eq!(source.request_timeout, Duration::from_secs(30));
        assert!(source.access_token.is_none());
    }
}
