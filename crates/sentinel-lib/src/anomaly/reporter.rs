//! Anomaly reporting sinks
//!
//! The engine hands detected anomalies to one or more reporters. Reporters
//! are swappable and never feed back into engine state.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Anomaly;
use crate::observability::StructuredLogger;

/// Errors raised while delivering anomaly reports
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook rejected alerts with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Destination for detected anomalies
#[async_trait]
pub trait AnomalyReporter: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Deliver the anomalies of one cycle
    async fn report(&self, anomalies: &[Anomaly]) -> Result<(), ReportError>;
}

/// Render an anomaly as a single line of text
pub fn format_anomaly_line(anomaly: &Anomaly) -> String {
    format!(
        "Anomaly detected: {} at {} with value {:.2} - {}",
        anomaly.metric_id, anomaly.timestamp, anomaly.value, anomaly.message
    )
}

/// Writes one text line per anomaly, stdout by default
pub struct ConsoleReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleReporter {
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::stdout()
    }
}

#[async_trait]
impl AnomalyReporter for ConsoleReporter {
    fn name(&self) -> &str {
        "console"
    }

    async fn report(&self, anomalies: &[Anomaly]) -> Result<(), ReportError> {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        for anomaly in anomalies {
            writeln!(out, "{}", format_anomaly_line(anomaly))?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Emits one structured log event per anomaly
pub struct LogReporter {
    logger: StructuredLogger,
}

impl LogReporter {
    pub fn new(logger: StructuredLogger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl AnomalyReporter for LogReporter {
    fn name(&self) -> &str {
        "log"
    }

    async fn report(&self, anomalies: &[Anomaly]) -> Result<(), ReportError> {
        for anomaly in anomalies {
            self.logger.log_anomaly(anomaly);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    /// Writer that keeps everything in a shared buffer
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn test_anomaly(value: f64) -> Anomaly {
        Anomaly {
            metric_id: "custom.googleapis.com/queue_depth".to_string(),
            value,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            message: "Value deviates significantly from the mean (Z-score: 4.20)".to_string(),
            z_score: 4.2,
            baseline_mean: 10.0,
            baseline_std_dev: 1.0,
        }
    }

    #[test]
    fn test_format_anomaly_line() {
        let line = format_anomaly_line(&test_anomaly(14.2));

        assert_eq!(
            line,
            "Anomaly detected: custom.googleapis.com/queue_depth at 2024-01-01 00:00:00 UTC \
             with value 14.20 - Value deviates significantly from the mean (Z-score: 4.20)"
        );
    }

    #[tokio::test]
    async fn test_console_reporter_writes_one_line_per_anomaly() {
        let buf = SharedBuf::default();
        let reporter = ConsoleReporter::with_writer(Box::new(buf.clone()));

        reporter
            .report(&[test_anomaly(14.2), test_anomaly(15.0)])
            .await
            .unwrap();

        let written = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written.lines().count(), 2);
        assert!(written.contains("with value 15.00"));
    }

    #[test]
    fn test_log_reporter_accepts_anomalies() {
        let reporter = LogReporter::new(StructuredLogger::new("test-project"));
        assert!(tokio_test::block_on(reporter.report(&[test_anomaly(14.2)])).is_ok());
        assert_eq!(reporter.name(), "log");
    }
}
