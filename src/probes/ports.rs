//! TCP-connect port scanner.
//!
//! A port is open when a connection completes within the per-port timeout
//! and closed otherwise. Refused, filtered and unreachable are not told
//! apart; use the nmap probe for that.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::{to_metrics, Probe, ProbeError, TestResult, TestStatus};

pub const TEST_NAME: &str = "Port Scan";

pub const DEFAULT_PORT_TIMEOUT: Duration = Duration::from_secs(2);

/// Connections in flight at once for a single scan.
const SCAN_CONCURRENCY: usize = 64;

/// Common services.
pub const TOP_20: [u16; 20] = [
    21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 443, 445, 993, 995, 1723, 3306, 3389, 5900,
    8080,
];

/// Extended set.
pub const TOP_100: [u16; 95] = [
    7, 9, 13, 21, 22, 23, 25, 26, 37, 53, 79, 80, 81, 88, 106, 110, 111, 113, 119, 135, 139, 143,
    144, 179, 199, 389, 427, 443, 444, 445, 465, 513, 514, 515, 543, 544, 548, 554, 587, 631, 646,
    873, 990, 993, 995, 1025, 1026, 1027, 1028, 1029, 1110, 1433, 1720, 1723, 1755, 1900, 2000,
    2049, 2121, 2717, 3000, 3128, 3306, 3389, 3986, 4899, 5000, 5009, 5051, 5060, 5101, 5190, 5357,
    5432, 5631, 5666, 5800, 5900, 6000, 6646, 7070, 8000, 8008, 8009, 8080, 8443, 8888, 9100, 9999,
    32768, 49152, 49153, 49154, 49155, 49156,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortPreset {
    #[default]
    Top20,
    Top100,
}

impl PortPreset {
    pub fn ports(&self) -> &'static [u16] {
        match self {
            PortPreset::Top20 => &TOP_20,
            PortPreset::Top100 => &TOP_100,
        }
    }
}

impl FromStr for PortPreset {
    type Err = ProbeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "top20" => Ok(PortPreset::Top20),
            "top100" => Ok(PortPreset::Top100),
            other => Err(ProbeError::UnknownPreset(other.to_string())),
        }
    }
}

/// Parse "22,80,8000-8010" into a port list.
pub fn parse_port_list(s: &str) -> std::result::Result<Vec<u16>, ProbeError> {
    let invalid = || ProbeError::InvalidPorts(s.to_string());
    let mut ports = Vec::new();

    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: u16 = lo.trim().parse().map_err(|_| invalid())?;
                let hi: u16 = hi.trim().parse().map_err(|_| invalid())?;
                if lo == 0 || lo > hi {
                    return Err(invalid());
                }
                ports.extend(lo..=hi);
            }
            None => {
                let port: u16 = part.parse().map_err(|_| invalid())?;
                if port == 0 {
                    return Err(invalid());
                }
                ports.push(port);
            }
        }
    }

    if ports.is_empty() {
        return Err(invalid());
    }
    Ok(ports)
}

/// Every scanned port lands in exactly one list; both are sorted ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortScanOutcome {
    pub open: Vec<u16>,
    pub closed: Vec<u16>,
}

#[derive(Debug, Serialize)]
struct PortScanMetrics<'a> {
    open_ports: &'a [u16],
    closed_count: usize,
    total_ports: usize,
    open_count: usize,
}

async fn port_is_open(host: &str, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// TCP-connect each distinct port in `ports`.
pub async fn scan_ports(host: &str, ports: &[u16], per_port_timeout: Duration) -> PortScanOutcome {
    let unique: BTreeSet<u16> = ports.iter().copied().collect();

    let probed: Vec<(u16, bool)> = stream::iter(unique)
        .map(|port| async move { (port, port_is_open(host, port, per_port_timeout).await) })
        .buffer_unordered(SCAN_CONCURRENCY)
        .collect()
        .await;

    let mut outcome = PortScanOutcome::default();
    for (port, open) in probed {
        if open {
            debug!(host, port, "Port open");
            outcome.open.push(port);
        } else {
            outcome.closed.push(port);
        }
    }
    outcome.open.sort_unstable();
    outcome.closed.sort_unstable();
    outcome
}

pub struct PortScanProbe {
    ports: Vec<u16>,
    per_port_timeout: Duration,
}

impl Default for PortScanProbe {
    fn default() -> Self {
        Self::from_preset(PortPreset::default())
    }
}

impl PortScanProbe {
    pub fn new(ports: Vec<u16>) -> Self {
        Self {
            ports,
            per_port_timeout: DEFAULT_PORT_TIMEOUT,
        }
    }

    pub fn from_preset(preset: PortPreset) -> Self {
        Self::new(preset.ports().to_vec())
    }

    pub fn with_timeout(mut self, per_port_timeout: Duration) -> Self {
        self.per_port_timeout = per_port_timeout;
        self
    }
}

#[async_trait::async_trait]
impl Probe for PortScanProbe {
    fn name(&self) -> &str {
        TEST_NAME
    }

    async fn run(&self, target: &str) -> Result<TestResult> {
        let started = Utc::now();
        let clock = Instant::now();

        let outcome = scan_ports(target, &self.ports, self.per_port_timeout).await;
        let total = outcome.open.len() + outcome.closed.len();
        info!(target, open = outcome.open.len(), total, "Port scan complete");

        let status = if total > 0 {
            TestStatus::Success
        } else {
            TestStatus::Warning
        };
        let open_list = if outcome.open.is_empty() {
            " None open.".to_string()
        } else {
            let list: Vec<String> = outcome.open.iter().map(u16::to_string).collect();
            format!(" Open: {}", list.join(", "))
        };
        let summary = format!(
            "Found {} open port(s) out of {} scanned on {}.{}",
            outcome.open.len(),
            total,
            target,
            open_list
        );

        let metrics = PortScanMetrics {
            open_ports: &outcome.open,
            closed_count: outcome.closed.len(),
            total_ports: total,
            open_count: outcome.open.len(),
        };

        Ok(TestResult::new(TEST_NAME, target, status, started)
            .with_duration(clock.elapsed().as_secs_f64())
            .with_metrics(to_metrics(&metrics))
            .with_summary(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_presets() {
        assert_eq!(TOP_20.len(), 20);
        assert!(TOP_100.windows(2).all(|w| w[0] < w[1]));
        assert_eq!("TOP100".parse::<PortPreset>().unwrap(), PortPreset::Top100);
        assert!("top5".parse::<PortPreset>().is_err());
    }

    #[test]
    fn test_parse_port_list() {
        assert_eq!(parse_port_list("22, 80,8000-8002").unwrap(), vec![22, 80, 8000, 8001, 8002]);
        assert!(parse_port_list("").is_err());
        assert!(parse_port_list("0").is_err());
        assert!(parse_port_list("90-80").is_err());
        assert!(parse_port_list("http").is_err());
    }

    #[tokio::test]
    async fn test_scan_partitions_every_port() {
        let ports = [443, 22, 80, 9999, 22];
        let outcome = scan_ports("127.0.0.1", &ports, Duration::from_millis(300)).await;

        let mut all: Vec<u16> = outcome.open.iter().chain(&outcome.closed).copied().collect();
        all.sort_unstable();
        assert_eq!(all, vec![22, 80, 443, 9999]);
        assert!(outcome.open.windows(2).all(|w| w[0] < w[1]));
        assert!(outcome.closed.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_scan_finds_listener() {
        let open = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = open.local_addr().unwrap().port();
        let closed_port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };

        let probe = PortScanProbe::new(vec![closed_port, open_port]).with_timeout(Duration::from_secs(1));
        let res = probe.run("127.0.0.1").await.unwrap();

        assert_eq!(res.status, TestStatus::Success);
        assert_eq!(res.metric_u64("open_count"), Some(1));
        assert_eq!(res.metric_u64("total_ports"), Some(2));
        assert_eq!(res.metrics["open_ports"], serde_json::json!([open_port]));
        assert!(res.summary.contains(&format!("Open: {}", open_port)));
    }

    #[tokio::test]
    async fn test_empty_port_list_is_warning() {
        let res = PortScanProbe::new(Vec::new()).run("127.0.0.1").await.unwrap();
        assert_eq!(res.status, TestStatus::Warning);
        assert!(res.summary.ends_with("None open."));
    }
}
