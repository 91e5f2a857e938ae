//! `traceroute -n` / `tracert -d` hop parsing.
//!
//! Windows hop lines carry three timing columns before the address; only
//! the hop number and address are taken from them, so `rtt_ms` is always
//! `0.0` on that branch.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// " 1  192.168.1.1  1.234 ms  1.101 ms  0.998 ms"
static UNIX_HOP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s+(\S+)\s+([\d.<]+)\s*ms").expect("unix hop regex"));

// "  1    <1 ms    <1 ms    <1 ms  192.168.1.1"
static WIN_HOP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)\s+(?:[\d.<]+\s*ms\s+)+(\d+\.\d+\.\d+\.\d+)").expect("windows hop regex")
});

static LEADING_INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+").expect("leading int regex"));

static IPV4_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\.\d+\.\d+\.\d+").expect("ipv4 token regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopDetail {
    pub hop: u32,
    pub host: String,
    pub rtt_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TracerouteMetrics {
    pub hop_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hop_details: Vec<HopDetail>,
    pub destination_reached: bool,
}

pub fn parse_traceroute(output: &str) -> TracerouteMetrics {
    let lines: Vec<&str> = output.trim().lines().collect();
    let mut hop_details = Vec::new();

    for line in &lines {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(caps) = UNIX_HOP_RE.captures(line) {
            let Ok(hop) = caps[1].parse::<u32>() else { continue };
            let rtt = &caps[3];
            let rtt_ms = if rtt.starts_with('<') {
                0.0
            } else {
                rtt.parse::<f64>().unwrap_or(0.0)
            };
            hop_details.push(HopDetail {
                hop,
                host: caps[2].to_string(),
                rtt_ms,
            });
            continue;
        }

        if let Some(caps) = WIN_HOP_RE.captures(line) {
            let Ok(hop) = caps[1].parse::<u32>() else { continue };
            hop_details.push(HopDetail {
                hop,
                host: caps[2].to_string(),
                rtt_ms: 0.0,
            });
        }
    }

    let hop_count = if hop_details.is_empty() {
        lines.iter().filter(|l| LEADING_INT_RE.is_match(l)).count()
    } else {
        hop_details.len()
    };

    let destination_reached = lines
        .last()
        .map(|last| IPV4_TOKEN_RE.is_match(last))
        .unwrap_or(false);

    TracerouteMetrics {
        hop_count,
        hop_details,
        destination_reached,
    }
}
