//! Heterogeneous batches: several named probes, each with its own target,
//! run concurrently and grouped by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use super::executor::{Job, ParallelExecutor};
use super::{ConfigError, ParallelTestConfig};
use crate::probes::{Probe, TestResult};

#[derive(Clone)]
pub struct BatchTask {
    pub name: String,
    pub probe: Arc<dyn Probe>,
    pub target: String,
}

impl BatchTask {
    pub fn new(name: impl Into<String>, probe: Arc<dyn Probe>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            probe,
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchRunner {
    executor: ParallelExecutor,
}

impl BatchRunner {
    pub fn new(config: ParallelTestConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            executor: ParallelExecutor::new(config)?,
        })
    }

    pub fn from_executor(executor: ParallelExecutor) -> Self {
        Self { executor }
    }

    pub async fn run_batch(&self, tasks: Vec<BatchTask>) -> BTreeMap<String, Vec<TestResult>> {
        self.run_batch_with_progress(tasks, |_, _| {}).await
    }

    /// Every task contributes exactly one result under its name.
    pub async fn run_batch_with_progress<F>(
        &self,
        tasks: Vec<BatchTask>,
        progress: F,
    ) -> BTreeMap<String, Vec<TestResult>>
    where
        F: FnMut(usize, usize) + Send,
    {
        let names: Vec<String> = tasks.iter().map(|t| t.name.clone()).collect();
        let jobs = tasks
            .into_iter()
            .map(|t| Job {
                name: t.name,
                probe: t.probe,
                target: t.target,
            })
            .collect();

        let mut grouped: BTreeMap<String, Vec<TestResult>> = BTreeMap::new();
        for (idx, result) in self.executor.run_jobs(jobs, progress).await {
            grouped.entry(names[idx].clone()).or_default().push(result);
        }

        info!(tasks = names.len(), groups = grouped.len(), "Batch complete");
        grouped
    }
}
