//! Name resolution via `dig +short` / `nslookup`.

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, warn};

use super::{to_metrics, Metrics, Probe, ProbeEnv, TestResult, TestStatus};

pub const TEST_NAME: &str = "DNS Lookup";

/// DNS Resolution Probe
pub struct DnsProbe {
    env: ProbeEnv,
}

impl DnsProbe {
    pub fn new(env: ProbeEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Probe for DnsProbe {
    fn name(&self) -> &str {
        TEST_NAME
    }

    async fn run(&self, target: &str) -> Result<TestResult> {
        let started = Utc::now();
        let spec = self.env.tools.dns_lookup(target);
        let out = self.env.runner.run(&spec, self.env.command_timeout).await;

        if !out.success {
            warn!(target, error = %out.error_text(), "DNS lookup failed");
            return Ok(TestResult::new(TEST_NAME, target, TestStatus::Failure, started)
                .with_duration(out.duration)
                .with_metrics(Metrics::new())
                .with_summary(format!("DNS lookup failed: {}", out.error_text()))
                .with_raw_output(Some(out.stdout.clone()))
                .with_error(Some(out.error_text())));
        }

        let metrics = self.env.tools.parse_dns(&out.stdout);
        debug!(target, ipv4 = metrics.ipv4_count, ipv6 = metrics.ipv6_count, "DNS answer parsed");

        let (status, summary) = if metrics.resolved {
            let mut kinds = Vec::new();
            if metrics.ipv4_count > 0 {
                kinds.push(format!("{} IPv4", metrics.ipv4_count));
            }
            if metrics.ipv6_count > 0 {
                kinds.push(format!("{} IPv6", metrics.ipv6_count));
            }
            let shown: Vec<&str> = metrics.ip_addresses.iter().take(3).map(String::as_str).collect();
            (
                TestStatus::Success,
                format!(
                    "Resolved {} to {} address(es) ({}): {}",
                    target,
                    metrics.ip_count,
                    kinds.join(" + "),
                    shown.join(", ")
                ),
            )
        } else {
            (TestStatus::Warning, format!("Could not resolve {}", target))
        };

        Ok(TestResult::new(TEST_NAME, target, status, started)
            .with_duration(out.duration)
            .with_metrics(to_metrics(&metrics))
            .with_summary(summary)
            .with_raw_output(Some(out.stdout.clone())))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::platform::{OsType, UnixTools};
    use crate::probes::testing::FakeRunner;

    static MAC: UnixTools = UnixTools::new(OsType::MacOs, false);

    async fn run(runner: FakeRunner, target: &str) -> TestResult {
        let probe = DnsProbe::new(ProbeEnv::new(Arc::new(runner), &MAC));
        probe.run(target).await.unwrap()
    }

    #[tokio::test]
    async fn test_dual_stack_answer() {
        let res = run(
            FakeRunner::ok("93.184.216.34\n2606:2800:220:1:248:1893:25c8:1946\n"),
            "example.com",
        )
        .await;
        assert_eq!(res.status, TestStatus::Success);
        assert_eq!(res.metric_u64("ip_count"), Some(2));
        assert_eq!(res.metric_bool("has_ipv6"), Some(true));
        assert_eq!(
            res.summary,
            "Resolved example.com to 2 address(es) (1 IPv4 + 1 IPv6): 93.184.216.34, 2606:2800:220:1:248:1893:25c8:1946"
        );
    }

    #[tokio::test]
    async fn test_empty_answer_is_warning() {
        let res = run(FakeRunner::ok(""), "nowhere.invalid").await;
        assert_eq!(res.status, TestStatus::Warning);
        assert_eq!(res.metric_bool("resolved"), Some(false));
        assert_eq!(res.summary, "Could not resolve nowhere.invalid");
    }

    #[tokio::test]
    async fn test_tool_failure() {
        let res = run(FakeRunner::with(9, "", ";; connection timed out; no servers could be reached"), "example.com").await;
        assert_eq!(res.status, TestStatus::Failure);
        assert!(res.metrics.is_empty());
        assert!(res.error.unwrap().contains("no servers"));
    }
}
