//! Concurrent orchestration of probes: one probe over many targets
//! ([`ParallelExecutor`]), a named mix of probes ([`BatchRunner`]) and
//! periodic repetition ([`ContinuousMonitor`]).

pub mod batch;
pub mod executor;
pub mod monitor;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::probes::{TestResult, TestStatus};

pub use batch::{BatchRunner, BatchTask};
pub use executor::ParallelExecutor;
pub use monitor::{ContinuousMonitor, MonitorCycle, MonitorHandle, MonitorState};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_workers must be greater than 0")]
    ZeroWorkers,

    #[error("timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),

    #[error("rate_limit must be a positive number of requests per second, got {0}")]
    InvalidRateLimit(f64),

    #[error("interval must be a positive number of seconds")]
    InvalidInterval,
}

/// Tuning for parallel runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelTestConfig {
    /// Probes in flight at once.
    pub max_workers: usize,
    /// Per-probe deadline in seconds.
    pub timeout: f64,
    /// Dispatches per second; `None` dispatches as fast as workers free up.
    pub rate_limit: Option<f64>,
    // Accepted and validated but not acted on by the executor yet.
    pub retry_failed: bool,
    pub retry_count: u32,
}

impl Default for ParallelTestConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            timeout: 30.0,
            rate_limit: None,
            retry_failed: false,
            retry_count: 3,
        }
    }
}

/// `secs` as a `Duration`, or `None` unless it is positive and representable.
pub fn positive_secs(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

impl ParallelTestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if positive_secs(self.timeout).is_none() {
            return Err(ConfigError::InvalidTimeout(self.timeout));
        }
        if let Some(rate) = self.rate_limit {
            if !rate.is_finite() || positive_secs(1.0 / rate).is_none() {
                return Err(ConfigError::InvalidRateLimit(rate));
            }
        }
        Ok(())
    }

    /// Only meaningful on a validated config.
    pub fn timeout_duration(&self) -> Duration {
        positive_secs(self.timeout).unwrap_or(Duration::from_secs(30))
    }

    /// Minimum spacing between two dispatches.
    pub fn dispatch_interval(&self) -> Option<Duration> {
        self.rate_limit.and_then(|rate| positive_secs(1.0 / rate))
    }
}

/// Outcome counts for a set of results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub success: usize,
    pub warning: usize,
    pub failure: usize,
    pub error: usize,
    /// Percentage of `success` results, 0.0 for an empty run.
    pub success_rate: f64,
}

impl RunSummary {
    pub fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a TestResult>,
    {
        let mut summary = RunSummary::default();
        for r in results {
            summary.total += 1;
            match r.status {
                TestStatus::Success => summary.success += 1,
                TestStatus::Warning => summary.warning += 1,
                TestStatus::Failure => summary.failure += 1,
                TestStatus::Error => summary.error += 1,
            }
        }
        if summary.total > 0 {
            summary.success_rate = summary.success as f64 / summary.total as f64 * 100.0;
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.failure + self.error > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_defaults_validate() {
        let cfg = ParallelTestConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_workers, 10);
        assert_eq!(cfg.timeout_duration(), Duration::from_secs(30));
        assert!(cfg.dispatch_interval().is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cfg = ParallelTestConfig { max_workers: 0, ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroWorkers));

        let cfg = ParallelTestConfig { timeout: 0.0, ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidTimeout(0.0)));

        let cfg = ParallelTestConfig { rate_limit: Some(-1.0), ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidRateLimit(-1.0)));

        let cfg = ParallelTestConfig { timeout: 1e20, ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidTimeout(1e20)));
        assert_eq!(cfg.timeout_duration(), Duration::from_secs(30));

        let cfg = ParallelTestConfig { timeout: f64::INFINITY, ..Default::default() };
        assert!(cfg.validate().is_err());

        let cfg = ParallelTestConfig { rate_limit: Some(1e-300), ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidRateLimit(1e-300)));
        assert_eq!(cfg.dispatch_interval(), None);

        let cfg = ParallelTestConfig { rate_limit: Some(f64::INFINITY), ..Default::default() };
        assert!(cfg.validate().is_err());

        let cfg = ParallelTestConfig { rate_limit: Some(4.0), ..Default::default() };
        assert_eq!(cfg.dispatch_interval(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: ParallelTestConfig = toml::from_str("max_workers = 3").unwrap();
        assert_eq!(cfg.max_workers, 3);
        assert_eq!(cfg.timeout, 30.0);
        assert_eq!(cfg.retry_count, 3);
    }

    #[test]
    fn test_summary_counts() {
        let now = Utc::now();
        let results = vec![
            TestResult::new("t", "a", TestStatus::Success, now),
            TestResult::new("t", "b", TestStatus::Success, now),
            TestResult::new("t", "c", TestStatus::Warning, now),
            TestResult::new("t", "d", TestStatus::Error, now),
        ];
        let s = RunSummary::from_results(&results);
        assert_eq!((s.total, s.success, s.warning, s.failure, s.error), (4, 2, 1, 0, 1));
        assert_eq!(s.success_rate, 50.0);
        assert!(s.has_failures());

        assert_eq!(RunSummary::from_results(Vec::<TestResult>::new().iter()).success_rate, 0.0);
    }
}
