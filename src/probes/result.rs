//! Canonical test result shared by every probe, the parallel executor and
//! the storage layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered metric name -> value mapping.
pub type Metrics = Map<String, Value>;

/// Outcome class of a probe run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Success,
    Warning,
    Failure,
    Error,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Success => "success",
            TestStatus::Warning => "warning",
            TestStatus::Failure => "failure",
            TestStatus::Error => "error",
        }
    }

    /// `Failure` and `Error` both mean the probe did not produce a usable answer.
    pub fn is_failed(&self) -> bool {
        matches!(self, TestStatus::Failure | TestStatus::Error)
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Success => write!(f, "SUCCESS"),
            TestStatus::Warning => write!(f, "WARN"),
            TestStatus::Failure => write!(f, "FAIL"),
            TestStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// One probe run against one target.
///
/// Built once at the end of a run and handed to the caller by value; nothing
/// in the crate mutates a result after it leaves the probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_name: String,
    pub target: String,
    pub status: TestStatus,
    pub timestamp: DateTime<Utc>,
    /// Elapsed wall-clock seconds, subprocess time included.
    pub duration: f64,
    #[serde(default)]
    pub metrics: Metrics,
    pub summary: String,
    pub raw_output: Option<String>,
    pub error: Option<String>,
}

impl TestResult {
    pub fn new(
        test_name: impl Into<String>,
        target: impl Into<String>,
        status: TestStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            target: target.into(),
            status,
            timestamp,
            duration: 0.0,
            metrics: Metrics::new(),
            summary: String::new(),
            raw_output: None,
            error: None,
        }
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration = secs;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_raw_output(mut self, raw: Option<String>) -> Self {
        self.raw_output = raw;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    /// Result substituted when a probe returned an error or panicked.
    pub fn errored(test_name: impl Into<String>, target: impl Into<String>, message: &str) -> Self {
        Self::new(test_name, target, TestStatus::Error, Utc::now())
            .with_summary(format!("Test failed: {}", message))
            .with_raw_output(Some(message.to_string()))
            .with_error(Some(message.to_string()))
    }

    /// Result substituted when a probe missed the executor deadline.
    pub fn timed_out(test_name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(test_name, target, TestStatus::Error, Utc::now())
            .with_summary("Test timed out")
            .with_raw_output(Some("Timeout".to_string()))
            .with_error(Some("Timeout".to_string()))
    }

    pub fn metric(&self, key: &str) -> Option<&Value> {
        self.metrics.get(key)
    }

    pub fn metric_f64(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).and_then(Value::as_f64)
    }

    pub fn metric_u64(&self, key: &str) -> Option<u64> {
        self.metrics.get(key).and_then(Value::as_u64)
    }

    pub fn metric_bool(&self, key: &str) -> Option<bool> {
        self.metrics.get(key).and_then(Value::as_bool)
    }
}

/// Flatten a typed metrics struct into the canonical mapping.
///
/// Struct field order is kept (`serde_json` is built with `preserve_order`);
/// anything that does not serialize to a JSON object yields an empty mapping.
pub fn to_metrics<T: Serialize>(value: &T) -> Metrics {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Metrics::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        packet_loss: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        avg_latency: Option<f64>,
    }

    #[test]
    fn test_to_metrics_keeps_field_order_and_skips_absent() {
        let m = to_metrics(&Sample { packet_loss: 0, avg_latency: None });
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["packet_loss"]);

        let m = to_metrics(&Sample { packet_loss: 5, avg_latency: Some(1.5) });
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["packet_loss", "avg_latency"]);
    }

    #[test]
    fn test_timed_out_shape() {
        let r = TestResult::timed_out("Ping Test", "10.0.0.1");
        assert_eq!(r.status, TestStatus::Error);
        assert_eq!(r.error.as_deref(), Some("Timeout"));
        assert_eq!(r.duration, 0.0);
        assert!(r.metrics.is_empty());
        assert_eq!(r.target, "10.0.0.1");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TestStatus::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
        assert!(TestStatus::Error.is_failed());
        assert!(!TestStatus::Warning.is_failed());
    }
}
