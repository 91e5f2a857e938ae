//! Bounded-concurrency probe execution with per-task deadlines.
//!
//! Every submitted job resolves to exactly one [`TestResult`]. Probe errors,
//! panics and missed deadlines are turned into `error` results here and never
//! reach the caller as `Err` or as a panic.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ConfigError, ParallelTestConfig, RunSummary};
use crate::probes::{Probe, TestResult};

/// One unit of work: which probe to run against which target. `name` is the
/// `test_name` used when the executor has to synthesize the result.
#[derive(Clone)]
pub(crate) struct Job {
    pub name: String,
    pub probe: Arc<dyn Probe>,
    pub target: String,
}

/// Spaces out task starts so that at most one task begins per `interval`.
struct DispatchGate {
    interval: Duration,
    next: Mutex<Instant>,
}

impl DispatchGate {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Mutex::new(Instant::now()),
        }
    }

    async fn wait(&self) {
        // Held across the sleep so waiters queue up behind each other.
        let mut next = self.next.lock().await;
        let now = Instant::now();
        if *next > now {
            tokio::time::sleep_until(*next).await;
        }
        *next = (*next).max(now) + self.interval;
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "probe panicked".to_string()
    }
}

/// Run one job under `deadline`, converting every failure mode into a result.
async fn run_one(job: Job, deadline: Duration) -> TestResult {
    let Job { name, probe, target } = job;

    let inner_target = target.clone();
    let mut handle = tokio::spawn(async move { probe.run(&inner_target).await });

    match tokio::time::timeout(deadline, &mut handle).await {
        Ok(Ok(Ok(result))) => result,
        Ok(Ok(Err(e))) => {
            warn!(test = %name, target = %target, error = %e, "Probe returned an error");
            TestResult::errored(name, target, &format!("{:#}", e))
        }
        Ok(Err(join_err)) => {
            let message = if join_err.is_panic() {
                panic_message(join_err.into_panic())
            } else {
                join_err.to_string()
            };
            warn!(test = %name, target = %target, error = %message, "Probe panicked");
            TestResult::errored(name, target, &message)
        }
        Err(_) => {
            // Dropping the probe future kills any child it spawned.
            handle.abort();
            warn!(test = %name, target = %target, timeout_secs = deadline.as_secs_f64(), "Probe timed out");
            TestResult::timed_out(name, target)
        }
    }
}

/// Runs probes concurrently, bounded by `max_workers`.
///
/// Results come back in completion order, not submission order; callers
/// that need to correlate use the `target` field.
#[derive(Debug, Clone, Default)]
pub struct ParallelExecutor {
    config: ParallelTestConfig,
}

impl ParallelExecutor {
    pub fn new(config: ParallelTestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ParallelTestConfig {
        &self.config
    }

    /// Run `probe` once per target.
    pub async fn execute_parallel(&self, probe: Arc<dyn Probe>, targets: &[String]) -> Vec<TestResult> {
        self.execute_parallel_with_progress(probe, targets, |_, _| {}).await
    }

    /// As [`execute_parallel`](Self::execute_parallel), calling
    /// `progress(completed, total)` once per finished task.
    pub async fn execute_parallel_with_progress<F>(
        &self,
        probe: Arc<dyn Probe>,
        targets: &[String],
        progress: F,
    ) -> Vec<TestResult>
    where
        F: FnMut(usize, usize) + Send,
    {
        let name = probe.name().to_string();
        let jobs = targets
            .iter()
            .map(|target| Job {
                name: name.clone(),
                probe: Arc::clone(&probe),
                target: target.clone(),
            })
            .collect();

        let results: Vec<TestResult> = self
            .run_jobs(jobs, progress)
            .await
            .into_iter()
            .map(|(_, result)| result)
            .collect();

        let summary = RunSummary::from_results(&results);
        info!(
            test = %name,
            total = summary.total,
            success = summary.success,
            failed = summary.failure + summary.error,
            "Parallel run complete"
        );
        results
    }

    /// Run `jobs`, returning `(job index, result)` pairs in completion order.
    pub(crate) async fn run_jobs<F>(&self, jobs: Vec<Job>, mut progress: F) -> Vec<(usize, TestResult)>
    where
        F: FnMut(usize, usize) + Send,
    {
        let total = jobs.len();
        if total == 0 {
            return Vec::new();
        }

        info!(
            total,
            workers = self.config.max_workers,
            timeout_secs = self.config.timeout,
            rate_limit = ?self.config.rate_limit,
            "Dispatching probes"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let gate = self.config.dispatch_interval().map(|i| Arc::new(DispatchGate::new(i)));
        let deadline = self.config.timeout_duration();

        // Kept so a task that dies outside `run_one` still yields a result.
        let labels: Vec<(String, String)> = jobs.iter().map(|j| (j.name.clone(), j.target.clone())).collect();

        let mut set = JoinSet::new();
        let mut owners = HashMap::with_capacity(total);
        for (idx, job) in jobs.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let gate = gate.clone();
            let handle = set.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                if let Some(gate) = gate {
                    gate.wait().await;
                }
                (idx, run_one(job, deadline).await)
            });
            owners.insert(handle.id(), idx);
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = set.join_next_with_id().await {
            let (idx, result) = match joined {
                Ok((_, done)) => done,
                Err(join_err) => {
                    let Some(&idx) = owners.get(&join_err.id()) else {
                        warn!(error = %join_err, "Unknown task failed");
                        continue;
                    };
                    let (name, target) = &labels[idx];
                    let message = if join_err.is_panic() {
                        panic_message(join_err.into_panic())
                    } else {
                        join_err.to_string()
                    };
                    (idx, TestResult::errored(name.clone(), target.clone(), &message))
                }
            };
            debug!(test = %result.test_name, target = %result.target, status = %result.status, "Task finished");
            results.push((idx, result));
            progress(results.len(), total);
        }
        results
    }
}
