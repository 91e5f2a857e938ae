//! Path discovery via `traceroute` / `tracert`.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use super::{to_metrics, Metrics, Probe, ProbeEnv, TestResult, TestStatus};
use crate::parsers::parse_traceroute;

pub const TEST_NAME: &str = "Traceroute Test";

pub struct TracerouteProbe {
    env: ProbeEnv,
    max_hops: u32,
}

impl TracerouteProbe {
    pub fn new(env: ProbeEnv) -> Self {
        // A 15-hop trace of silent routers easily outlives the default 30s.
        let env = env.with_command_timeout(Duration::from_secs(60));
        Self { env, max_hops: 15 }
    }

    pub fn with_max_hops(mut self, max_hops: u32) -> Self {
        self.max_hops = max_hops;
        self
    }
}

#[async_trait::async_trait]
impl Probe for TracerouteProbe {
    fn name(&self) -> &str {
        TEST_NAME
    }

    async fn run(&self, target: &str) -> Result<TestResult> {
        let started = Utc::now();
        info!(target, max_hops = self.max_hops, "Starting trace");

        let spec = self.env.tools.traceroute(target, self.max_hops);
        let out = self.env.runner.run(&spec, self.env.command_timeout).await;

        let (status, metrics, summary) = if out.success {
            let metrics = parse_traceroute(&out.stdout);
            info!(target, hops = metrics.hop_count, reached = metrics.destination_reached, "Trace complete");
            let summary = format!("Traced route to {} in {} hops", target, metrics.hop_count);
            (TestStatus::Success, to_metrics(&metrics), summary)
        } else {
            warn!(target, error = %out.error_text(), "Trace failed");
            let summary = format!("Traceroute failed: {}", out.error_text());
            (TestStatus::Failure, Metrics::new(), summary)
        };

        Ok(TestResult::new(TEST_NAME, target, status, started)
            .with_duration(out.duration)
            .with_metrics(metrics)
            .with_summary(summary)
            .with_raw_output(Some(out.stdout.clone()))
            .with_error((!out.success).then(|| out.error_text())))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::platform::WindowsTools;
    use crate::probes::testing::FakeRunner;

    static WINDOWS: WindowsTools = WindowsTools;

    #[tokio::test]
    async fn test_windows_trace() {
        let runner = Arc::new(FakeRunner::ok(
            "Tracing route to 1.1.1.1\n\n  1    <1 ms    <1 ms    <1 ms  192.168.1.1\n  2     9 ms     8 ms     9 ms  1.1.1.1\n",
        ));
        let probe = TracerouteProbe::new(ProbeEnv::new(runner.clone(), &WINDOWS));
        let res = probe.run("1.1.1.1").await.unwrap();

        assert_eq!(res.status, TestStatus::Success);
        assert_eq!(res.metric_u64("hop_count"), Some(2));
        assert_eq!(res.metric_bool("destination_reached"), Some(true));
        assert_eq!(res.summary, "Traced route to 1.1.1.1 in 2 hops");
        assert_eq!(runner.seen.lock().unwrap()[0], "tracert -d -h 15 1.1.1.1");
    }

    #[tokio::test]
    async fn test_failed_trace_has_no_metrics() {
        let runner = Arc::new(FakeRunner::with(1, "", "traceroute: unknown host x"));
        let probe = TracerouteProbe::new(ProbeEnv::new(runner, &WINDOWS));
        let res = probe.run("x").await.unwrap();
        assert_eq!(res.status, TestStatus::Failure);
        assert!(res.metrics.is_empty());
        assert_eq!(res.error.as_deref(), Some("traceroute: unknown host x"));
    }
}
