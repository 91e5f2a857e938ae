//! Periodic re-runs of one probe over a fixed target list.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ConfigError, ParallelExecutor, ParallelTestConfig, RunSummary};
use crate::probes::{Probe, TestResult};

pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Idle,
    Running,
    /// Ended by `stop()`.
    Stopped,
    /// Ended because the requested duration elapsed.
    Completed,
}

/// One pass over every target.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorCycle {
    pub timestamp: DateTime<Utc>,
    pub results: Vec<TestResult>,
    pub summary: RunSummary,
}

struct Shared {
    state: Mutex<MonitorState>,
    history: Mutex<VecDeque<MonitorCycle>>,
    cancel: Mutex<CancellationToken>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn stop(&self) {
        lock(&self.cancel).cancel();
    }

    fn state(&self) -> MonitorState {
        *lock(&self.state)
    }

    fn set_state(&self, state: MonitorState) {
        *lock(&self.state) = state;
    }
}

/// Stops a running monitor from another task.
#[derive(Clone)]
pub struct MonitorHandle {
    shared: Arc<Shared>,
}

impl MonitorHandle {
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn state(&self) -> MonitorState {
        self.shared.state()
    }
}

pub struct ContinuousMonitor {
    executor: ParallelExecutor,
    probe: Arc<dyn Probe>,
    targets: Vec<String>,
    interval: Duration,
    history_limit: usize,
    shared: Arc<Shared>,
}

impl ContinuousMonitor {
    pub fn new(
        probe: Arc<dyn Probe>,
        targets: Vec<String>,
        interval: Duration,
        config: ParallelTestConfig,
    ) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::InvalidInterval);
        }
        Ok(Self {
            executor: ParallelExecutor::new(config)?,
            probe,
            targets,
            interval,
            history_limit: DEFAULT_HISTORY_LIMIT,
            shared: Arc::new(Shared {
                state: Mutex::new(MonitorState::Idle),
                history: Mutex::new(VecDeque::new()),
                cancel: Mutex::new(CancellationToken::new()),
            }),
        })
    }

    /// Cycles retained; the oldest are dropped first. At least one is kept.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.shared.state()
    }

    /// Idempotent. A cycle already in flight finishes; the wait before the
    /// next one is cut short.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// The last `limit` cycles, oldest first. `None` or `Some(0)` returns
    /// every retained cycle.
    pub fn history(&self, limit: Option<usize>) -> Vec<MonitorCycle> {
        let history = lock(&self.shared.history);
        let skip = limit
            .filter(|&n| n > 0)
            .map_or(0, |n| history.len().saturating_sub(n));
        history.iter().skip(skip).cloned().collect()
    }

    /// Run cycles until stopped or `duration` elapses.
    pub async fn start(&self, duration: Option<Duration>) -> MonitorState {
        self.start_with_callback(duration, |_| {}).await
    }

    pub async fn start_with_callback<F>(&self, duration: Option<Duration>, mut on_cycle: F) -> MonitorState
    where
        F: FnMut(&[TestResult]) + Send,
    {
        let cancel = CancellationToken::new();
        *lock(&self.shared.cancel) = cancel.clone();
        self.shared.set_state(MonitorState::Running);

        let started = Instant::now();
        let mut cycles = 0u64;
        info!(
            targets = self.targets.len(),
            interval_secs = self.interval.as_secs_f64(),
            duration_secs = ?duration.map(|d| d.as_secs_f64()),
            "Monitor started"
        );

        let end_state = loop {
            let results = self.executor.execute_parallel(Arc::clone(&self.probe), &self.targets).await;
            cycles += 1;

            let cycle = MonitorCycle {
                timestamp: Utc::now(),
                summary: RunSummary::from_results(&results),
                results,
            };
            debug!(cycle = cycles, success_rate = cycle.summary.success_rate, "Monitor cycle done");

            {
                let mut history = lock(&self.shared.history);
                history.push_back(cycle.clone());
                while history.len() > self.history_limit {
                    history.pop_front();
                }
            }
            on_cycle(&cycle.results);

            if cancel.is_cancelled() {
                break MonitorState::Stopped;
            }
            if duration.is_some_and(|d| started.elapsed() >= d) {
                break MonitorState::Completed;
            }

            tokio::select! {
                _ = cancel.cancelled() => break MonitorState::Stopped,
                _ = tokio::time::sleep(self.interval) => {}
            }
        };

        self.shared.set_state(end_state);
        info!(cycles, state = ?end_state, "Monitor finished");
        end_state
    }
}
