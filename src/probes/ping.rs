//! ICMP reachability via the system `ping`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{to_metrics, Probe, ProbeEnv, TestResult, TestStatus};
use crate::exec::CommandResult;
use crate::parsers::{parse_ping, PingMetrics};

pub const TEST_NAME: &str = "Ping Test";

pub struct PingProbe {
    env: ProbeEnv,
    count: u32,
}

impl PingProbe {
    pub fn new(env: ProbeEnv) -> Self {
        Self { env, count: 4 }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count.max(1);
        self
    }
}

#[async_trait::async_trait]
impl Probe for PingProbe {
    fn name(&self) -> &str {
        TEST_NAME
    }

    async fn run(&self, target: &str) -> Result<TestResult> {
        let started = Utc::now();
        let spec = self.env.tools.ping(target, self.count);
        let out = self.env.runner.run(&spec, self.env.command_timeout).await;
        let result = classify(target, started, &out);

        if result.status == TestStatus::Success {
            info!(target, avg_ms = ?result.metric_f64("avg_latency"), "Ping complete");
        } else {
            warn!(target, status = %result.status, "Ping did not succeed");
        }
        Ok(result)
    }
}

/// Status policy: a clean exit with any reply is success, a clean exit with
/// every packet lost is a warning, anything else means the tool failed.
pub fn classify(target: &str, started: DateTime<Utc>, out: &CommandResult) -> TestResult {
    let metrics = if out.success {
        parse_ping(&out.stdout)
    } else {
        PingMetrics::default()
    };
    let loss = metrics.packet_loss.unwrap_or(100);

    let (status, summary) = if out.success && loss < 100 {
        let summary = match (metrics.min_latency, metrics.avg_latency, metrics.max_latency) {
            (Some(min), Some(avg), Some(max)) => format!(
                "Host {} is reachable. Latency min/avg/max: {:.1}/{:.1}/{:.1} ms",
                target, min, avg, max
            ),
            (_, Some(avg), _) => {
                format!("Host {} is reachable. Average latency: {:.1} ms", target, avg)
            }
            _ => format!("Host {} is reachable.", target),
        };
        (TestStatus::Success, summary)
    } else if out.success {
        (
            TestStatus::Warning,
            format!("Host {} is unreachable (100% packet loss)", target),
        )
    } else {
        (
            TestStatus::Failure,
            format!("Ping test failed: {}", out.error_text()),
        )
    };

    TestResult::new(TEST_NAME, target, status, started)
        .with_duration(out.duration)
        .with_metrics(to_metrics(&metrics))
        .with_summary(summary)
        .with_raw_output(Some(out.stdout.clone()))
        .with_error((!out.success).then(|| out.error_text()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::platform::{OsType, UnixTools};
    use crate::probes::testing::FakeRunner;

    static LINUX: UnixTools = UnixTools::new(OsType::Linux, true);

    fn probe(runner: FakeRunner) -> (PingProbe, Arc<FakeRunner>) {
        let runner = Arc::new(runner);
        let env = ProbeEnv::new(runner.clone(), &LINUX);
        (PingProbe::new(env), runner)
    }

    #[tokio::test]
    async fn test_reachable_host() {
        let (p, runner) = probe(FakeRunner::ok(
            "4 packets transmitted, 4 received, 0% packet loss, time 3004ms\n\
             rtt min/avg/max/mdev = 10.1/15.4/20.7/2.3 ms\n",
        ));
        let res = p.run("8.8.8.8").await.unwrap();
        assert_eq!(res.status, TestStatus::Success);
        assert_eq!(res.test_name, "Ping Test");
        assert_eq!(res.metric_u64("packet_loss"), Some(0));
        assert_eq!(res.metric_f64("avg_latency"), Some(15.4));
        assert_eq!(
            res.summary,
            "Host 8.8.8.8 is reachable. Latency min/avg/max: 10.1/15.4/20.7 ms"
        );
        assert!(res.error.is_none());
        assert_eq!(runner.seen.lock().unwrap()[0], "ping -c 4 8.8.8.8");
    }

    #[tokio::test]
    async fn test_total_loss_with_clean_exit_is_warning() {
        let (p, _) = probe(FakeRunner::ok(
            "4 packets transmitted, 0 received, 100% packet loss, time 3065ms\n",
        ));
        let res = p.run("10.255.255.1").await.unwrap();
        assert_eq!(res.status, TestStatus::Warning);
        assert_eq!(res.metric_u64("packet_loss"), Some(100));
        assert!(res.metric("avg_latency").is_none());
        assert!(res.metric("min_latency").is_none());
    }

    #[tokio::test]
    async fn test_tool_failure() {
        let (p, _) = probe(FakeRunner::with(2, "", "ping: unknown host nowhere.invalid"));
        let res = p.run("nowhere.invalid").await.unwrap();
        assert_eq!(res.status, TestStatus::Failure);
        assert!(res.metrics.is_empty());
        assert_eq!(res.error.as_deref(), Some("ping: unknown host nowhere.invalid"));
        assert_eq!(res.summary, "Ping test failed: ping: unknown host nowhere.invalid");
    }

    #[test]
    fn test_unparseable_clean_output_defaults_to_full_loss() {
        let out = CommandResult {
            command: "ping".into(),
            return_code: 0,
            stdout: "something odd".into(),
            stderr: String::new(),
            duration: 0.1,
            success: true,
        };
        let res = classify("h", Utc::now(), &out);
        assert_eq!(res.status, TestStatus::Warning);
    }
}
