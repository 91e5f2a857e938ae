//! `ping` summary parsing (iputils, BSD/macOS, busybox and Windows).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static LOSS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)%[^\n]*loss").expect("loss regex"));

// rtt min/avg/max/mdev = 10.1/15.4/20.7/2.3 ms
// round-trip min/avg/max/stddev = 10.1/15.4/20.7/2.3 ms
// round-trip min/avg/max = 10.1/15.4/20.7 ms
static RTT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"min/avg/max(?:/(?:mdev|stddev))?\s*=\s*([\d.]+)/([\d.]+)/([\d.]+)(?:/([\d.]+))?\s*ms",
    )
    .expect("rtt regex")
});

static WIN_AVG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Average\s*=\s*(\d+)\s*ms").expect("windows average regex"));

static RECEIVED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\s+(?:packets\s+)?received|Received\s*=\s*(\d+)").expect("received regex")
});

/// Metrics extracted from a ping run. Keys the output does not carry are
/// left out of the canonical mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_loss: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_latency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_latency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mdev_latency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packets_received: Option<u32>,
}

pub fn parse_ping(output: &str) -> PingMetrics {
    let mut metrics = PingMetrics::default();

    if let Some(caps) = LOSS_RE.captures(output) {
        // macOS reports fractional loss ("12.5% packet loss")
        metrics.packet_loss = caps[1].parse::<f64>().ok().map(|v| v.round() as u32);
    }

    if let Some(caps) = RTT_RE.captures(output) {
        metrics.min_latency = caps[1].parse().ok();
        metrics.avg_latency = caps[2].parse().ok();
        metrics.max_latency = caps[3].parse().ok();
        metrics.mdev_latency = caps.get(4).and_then(|m| m.as_str().parse().ok());
    } else if let Some(caps) = WIN_AVG_RE.captures(output) {
        // Windows only reports an integer average on this branch.
        metrics.avg_latency = caps[1].parse().ok();
    }

    if let Some(caps) = RECEIVED_RE.captures(output) {
        metrics.packets_received = caps
            .get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse().ok());
    }

    metrics
}
