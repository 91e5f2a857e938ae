//! Local neighbour discovery from the ARP table. The target is informational
//! only; the table is always the local one.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use super::{to_metrics, Probe, ProbeEnv, TestResult, TestStatus};
use crate::parsers::ArpMetrics;

pub const TEST_NAME: &str = "ARP Scan";

pub struct ArpProbe {
    env: ProbeEnv,
}

impl ArpProbe {
    pub fn new(env: ProbeEnv) -> Self {
        Self { env }
    }
}

#[async_trait::async_trait]
impl Probe for ArpProbe {
    fn name(&self) -> &str {
        TEST_NAME
    }

    async fn run(&self, target: &str) -> Result<TestResult> {
        let started = Utc::now();
        let spec = self.env.tools.arp_table();
        let out = self.env.runner.run(&spec, self.env.command_timeout).await;

        let (status, metrics, summary) = if out.success {
            let metrics = self.env.tools.parse_arp(&out.stdout);
            info!(devices = metrics.device_count, "ARP table read");
            let summary = format!("Found {} device(s) in ARP table", metrics.device_count);
            (TestStatus::Success, metrics, summary)
        } else {
            warn!(error = %out.error_text(), "ARP scan failed");
            (
                TestStatus::Failure,
                ArpMetrics::default(),
                format!("ARP scan failed: {}", out.error_text()),
            )
        };

        Ok(TestResult::new(TEST_NAME, target, status, started)
            .with_duration(out.duration)
            .with_metrics(to_metrics(&metrics))
            .with_summary(summary)
            .with_raw_output(Some(out.stdout.clone()))
            .with_error((!out.success).then(|| out.error_text())))
    }
}
