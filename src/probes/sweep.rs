//! Ping sweep: which hosts in a small CIDR range answer a single echo.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use ipnetwork::IpNetwork;
use serde::Serialize;
use tracing::{debug, info};

use super::{to_metrics, Probe, ProbeEnv, ProbeError, TestResult, TestStatus};

pub const TEST_NAME: &str = "Ping Sweep";

/// Largest range accepted, a /24.
pub const MAX_ADDRESSES: u128 = 256;

const SWEEP_CONCURRENCY: usize = 50;
const PING_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize)]
struct SweepMetrics {
    alive_count: usize,
    alive_hosts: Vec<String>,
    total_addresses: usize,
}

/// Parse a CIDR (host bits allowed) or a bare address, and enforce the size cap.
/// The returned network has its host bits cleared.
pub fn parse_network(target: &str) -> std::result::Result<IpNetwork, ProbeError> {
    let target = target.trim();
    let invalid = || ProbeError::InvalidNetwork(target.to_string());
    let net = if target.contains('/') {
        target.parse::<IpNetwork>().map_err(|_| invalid())?
    } else {
        target.parse::<IpAddr>().map(IpNetwork::from).map_err(|_| invalid())?
    };

    let max_prefix: u8 = match net {
        IpNetwork::V4(_) => 32,
        IpNetwork::V6(_) => 128,
    };
    let host_bits = u32::from(max_prefix - net.prefix());
    let count = 1u128.checked_shl(host_bits).unwrap_or(u128::MAX);
    if count > MAX_ADDRESSES {
        return Err(ProbeError::NetworkTooLarge { count });
    }
    IpNetwork::new(net.network(), net.prefix()).map_err(|_| invalid())
}

/// Usable host addresses: the network and broadcast addresses are left out
/// of IPv4 ranges with more than two addresses.
pub fn host_addresses(net: &IpNetwork) -> Vec<IpAddr> {
    let all: Vec<IpAddr> = net.iter().collect();
    match net {
        IpNetwork::V4(v4) if v4.prefix() <= 30 => all[1..all.len() - 1].to_vec(),
        _ => all,
    }
}

pub struct PingSweepProbe {
    env: ProbeEnv,
}

impl PingSweepProbe {
    pub fn new(env: ProbeEnv) -> Self {
        // One echo plus a second of slack per host.
        let env = env.with_command_timeout(PING_WAIT + Duration::from_secs(1));
        Self { env }
    }

    async fn is_alive(&self, host: IpAddr) -> bool {
        let spec = self.env.tools.ping_once(&host.to_string(), PING_WAIT);
        let out = self.env.runner.run(&spec, self.env.command_timeout).await;
        debug!(%host, alive = out.success, "Sweep ping");
        out.success
    }
}

#[async_trait::async_trait]
impl Probe for PingSweepProbe {
    fn name(&self) -> &str {
        TEST_NAME
    }

    async fn run(&self, target: &str) -> Result<TestResult> {
        let started = Utc::now();
        let clock = Instant::now();

        let net = match parse_network(target) {
            Ok(net) => net,
            Err(e) => {
                let summary = match &e {
                    ProbeError::InvalidNetwork(_) => format!("Invalid CIDR notation: {}", target),
                    other => other.to_string(),
                };
                return Ok(TestResult::new(TEST_NAME, target, TestStatus::Failure, started)
                    .with_summary(summary)
                    .with_error(Some(e.to_string())));
            }
        };

        let hosts = host_addresses(&net);
        info!(network = %net, hosts = hosts.len(), "Starting ping sweep");

        let mut alive: Vec<IpAddr> = stream::iter(hosts.iter().copied())
            .map(|host| async move { (host, self.is_alive(host).await) })
            .buffer_unordered(SWEEP_CONCURRENCY)
            .filter_map(|(host, up)| async move { up.then_some(host) })
            .collect()
            .await;
        alive.sort();

        let status = if alive.is_empty() {
            TestStatus::Warning
        } else {
            TestStatus::Success
        };
        let metrics = SweepMetrics {
            alive_count: alive.len(),
            alive_hosts: alive.iter().map(IpAddr::to_string).collect(),
            total_addresses: hosts.len(),
        };
        info!(network = %net, alive = metrics.alive_count, "Ping sweep complete");

        Ok(TestResult::new(TEST_NAME, target, status, started)
            .with_duration(clock.elapsed().as_secs_f64())
            .with_summary(format!("Found {} alive host(s) in {}", metrics.alive_count, target))
            .with_metrics(to_metrics(&metrics)))
    }
}
