//! Port and service scan through an external `nmap` (optional dependency).

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use super::{to_metrics, Metrics, Probe, ProbeEnv, TestResult, TestStatus};
use crate::exec::CommandSpec;
use crate::parsers::parse_nmap_xml;

pub const TEST_NAME: &str = "Nmap Scan";

const NMAP_TIMEOUT: Duration = Duration::from_secs(120);

pub fn has_nmap() -> bool {
    which::which("nmap").is_ok()
}

pub struct NmapProbe {
    env: ProbeEnv,
    ports: Option<String>,
    extra_args: Vec<String>,
    check_installed: bool,
}

impl NmapProbe {
    pub fn new(env: ProbeEnv) -> Self {
        Self {
            env: env.with_command_timeout(NMAP_TIMEOUT),
            ports: None,
            extra_args: vec!["-sT".to_string(), "-sV".to_string()],
            check_installed: true,
        }
    }

    /// `-p` value, e.g. "22,80,443" or "1-1024".
    pub fn with_ports(mut self, ports: Option<String>) -> Self {
        self.ports = ports.filter(|p| !p.trim().is_empty());
        self
    }

    /// Replaces the default `-sT -sV`.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        if !args.is_empty() {
            self.extra_args = args;
        }
        self
    }

    /// Skip the PATH lookup, for runners that do not spawn real processes.
    pub fn assume_installed(mut self) -> Self {
        self.check_installed = false;
        self
    }

    pub fn command(&self, target: &str) -> CommandSpec {
        let mut args = vec!["-oX".to_string(), "-".to_string()];
        args.extend(self.extra_args.iter().cloned());
        if let Some(ports) = &self.ports {
            args.push("-p".to_string());
            args.push(ports.clone());
        }
        args.push(target.to_string());
        CommandSpec::new("nmap", args)
    }
}

#[async_trait::async_trait]
impl Probe for NmapProbe {
    fn name(&self) -> &str {
        TEST_NAME
    }

    async fn run(&self, target: &str) -> Result<TestResult> {
        let started = Utc::now();

        if self.check_installed && !has_nmap() {
            let summary =
                "nmap is not installed or not found in PATH. Install nmap to use the Nmap Scan test.";
            warn!(target, "nmap missing");
            return Ok(TestResult::new(TEST_NAME, target, TestStatus::Failure, started)
                .with_summary(summary)
                .with_error(Some(summary.to_string())));
        }

        let spec = self.command(target);
        let out = self.env.runner.run(&spec, self.env.command_timeout).await;

        if !out.success {
            let summary = if out.return_code == -1 {
                format!("nmap scan failed: {}", out.error_text())
            } else {
                format!("nmap failed with exit code {}", out.return_code)
            };
            warn!(target, code = out.return_code, "nmap scan failed");
            let raw = if out.stdout.is_empty() { &out.stderr } else { &out.stdout };
            return Ok(TestResult::new(TEST_NAME, target, TestStatus::Failure, started)
                .with_duration(out.duration)
                .with_metrics(Metrics::new())
                .with_summary(summary)
                .with_raw_output(Some(raw.clone()))
                .with_error(Some(out.error_text())));
        }

        let metrics = parse_nmap_xml(&out.stdout);
        info!(target, open = metrics.open_count, hosts_up = metrics.hosts_up, "nmap scan complete");

        Ok(TestResult::new(TEST_NAME, target, TestStatus::Success, started)
            .with_duration(out.duration)
            .with_summary(format!("Nmap found {} open port(s) on {}", metrics.open_count, target))
            .with_metrics(to_metrics(&metrics))
            .with_raw_output(Some(out.stdout.clone())))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::platform::{OsType, UnixTools};
    use crate::probes::testing::FakeRunner;

    static LINUX: UnixTools = UnixTools::new(OsType::Linux, true);

    const XML: &str = r#"<?xml version="1.0"?><nmaprun><host><ports><port protocol="tcp" portid="22"><state state="open"/><service name="ssh"/></port></ports></host><runstats><hosts up="1" down="0" total="1"/></runstats></nmaprun>"#;

    #[test]
    fn test_command_line() {
        let env = ProbeEnv::new(Arc::new(FakeRunner::ok("")), &LINUX);
        let probe = NmapProbe::new(env).with_ports(Some("22,80".into()));
        assert_eq!(probe.command("10.0.0.1").to_string(), "nmap -oX - -sT -sV -p 22,80 10.0.0.1");

        let env = ProbeEnv::new(Arc::new(FakeRunner::ok("")), &LINUX);
        let probe = NmapProbe::new(env).with_args(vec!["-sn".into()]);
        assert_eq!(probe.command("10.0.0.0/24").to_string(), "nmap -oX - -sn 10.0.0.0/24");
    }

    #[tokio::test]
    async fn test_successful_scan() {
        let env = ProbeEnv::new(Arc::new(FakeRunner::ok(XML)), &LINUX);
        let res = NmapProbe::new(env).assume_installed().run("10.0.0.1").await.unwrap();
        assert_eq!(res.status, TestStatus::Success);
        assert_eq!(res.metric_u64("open_count"), Some(1));
        assert_eq!(res.summary, "Nmap found 1 open port(s) on 10.0.0.1");
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let env = ProbeEnv::new(Arc::new(FakeRunner::with(1, "", "Failed to resolve \"nope\".")), &LINUX);
        let res = NmapProbe::new(env).assume_installed().run("nope").await.unwrap();
        assert_eq!(res.status, TestStatus::Failure);
        assert_eq!(res.summary, "nmap failed with exit code 1");
        assert!(res.metrics.is_empty());
    }
}
