//! Diagnostic probes.
//!
//! A probe turns one target string into one [`TestResult`]: it runs a
//! toolchain command (or opens sockets), feeds the output to a parser and
//! classifies the outcome. Expected failures such as a missing tool, a
//! non-zero exit or a refused connection come back as `Ok` results with a
//! `failure`/`warning` status; `Err` is reserved for things the executor
//! should report as `error`.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;

use crate::exec::{CommandRunner, SystemRunner};
use crate::platform::{self, Toolchain};

pub mod arp;
pub mod dns;
pub mod nmap;
pub mod ping;
pub mod ports;
pub mod result;
pub mod sweep;
pub mod trace;

pub use result::{to_metrics, Metrics, TestResult, TestStatus};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("unknown test type '{0}' (expected one of: ping, traceroute, dns, ports, nmap, arp, sweep)")]
    UnknownKind(String),

    #[error("unknown port preset '{0}' (expected top20 or top100)")]
    UnknownPreset(String),

    #[error("invalid port list '{0}'")]
    InvalidPorts(String),

    #[error("invalid CIDR notation: {0}")]
    InvalidNetwork(String),

    #[error("CIDR range too large (max /24, got {count} addresses)")]
    NetworkTooLarge { count: u128 },
}

/// Trait for all diagnostic probes
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    /// Display name, also used as `test_name` on synthesized results.
    fn name(&self) -> &str;

    /// Run the probe against a target.
    async fn run(&self, target: &str) -> Result<TestResult>;
}

/// Adapts a synchronous `Fn(&str) -> Result<TestResult>` into a [`Probe`].
///
/// The closure runs on tokio's blocking pool. If the executor gives up on it
/// (timeout), the thread keeps running until the closure returns; only the
/// result is discarded.
pub struct BlockingProbe<F> {
    name: String,
    func: Arc<F>,
}

impl<F> BlockingProbe<F>
where
    F: Fn(&str) -> Result<TestResult> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

#[async_trait::async_trait]
impl<F> Probe for BlockingProbe<F>
where
    F: Fn(&str) -> Result<TestResult> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, target: &str) -> Result<TestResult> {
        let func = Arc::clone(&self.func);
        let target = target.to_string();
        match tokio::task::spawn_blocking(move || func(&target)).await {
            Ok(res) => res,
            // Re-raise so the executor sees the closure's own panic payload.
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(anyhow::anyhow!("blocking probe cancelled: {}", e)),
        }
    }
}

/// What every command-backed probe needs: a way to run commands, the
/// per-OS command templates and the subprocess deadline.
#[derive(Clone)]
pub struct ProbeEnv {
    pub runner: Arc<dyn CommandRunner>,
    pub tools: &'static dyn Toolchain,
    pub command_timeout: Duration,
}

impl ProbeEnv {
    pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(runner: Arc<dyn CommandRunner>, tools: &'static dyn Toolchain) -> Self {
        Self {
            runner,
            tools,
            command_timeout: Self::DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Real subprocesses and the toolchain detected for this OS.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemRunner), platform::toolchain())
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Probe selector used by the CLI (`--test ping`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Ping,
    Traceroute,
    Dns,
    Ports,
    Nmap,
    Arp,
    Sweep,
}

impl ProbeKind {
    pub const ALL: [ProbeKind; 7] = [
        ProbeKind::Ping,
        ProbeKind::Traceroute,
        ProbeKind::Dns,
        ProbeKind::Ports,
        ProbeKind::Nmap,
        ProbeKind::Arp,
        ProbeKind::Sweep,
    ];

    /// Executor deadline that leaves room for the probe's own subprocess
    /// timeout, for kinds that need more than the 30s default.
    pub fn min_deadline(self) -> Option<Duration> {
        match self {
            ProbeKind::Traceroute => Some(Duration::from_secs(65)),
            ProbeKind::Nmap => Some(Duration::from_secs(125)),
            _ => None,
        }
    }

    /// The probe with its default settings.
    pub fn build(self, env: &ProbeEnv) -> Arc<dyn Probe> {
        match self {
            ProbeKind::Ping => Arc::new(ping::PingProbe::new(env.clone())),
            ProbeKind::Traceroute => Arc::new(trace::TracerouteProbe::new(env.clone())),
            ProbeKind::Dns => Arc::new(dns::DnsProbe::new(env.clone())),
            ProbeKind::Ports => Arc::new(ports::PortScanProbe::default()),
            ProbeKind::Nmap => Arc::new(nmap::NmapProbe::new(env.clone())),
            ProbeKind::Arp => Arc::new(arp::ArpProbe::new(env.clone())),
            ProbeKind::Sweep => Arc::new(sweep::PingSweepProbe::new(env.clone())),
        }
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeKind::Ping => write!(f, "ping"),
            ProbeKind::Traceroute => write!(f, "traceroute"),
            ProbeKind::Dns => write!(f, "dns"),
            ProbeKind::Ports => write!(f, "ports"),
            ProbeKind::Nmap => write!(f, "nmap"),
            ProbeKind::Arp => write!(f, "arp"),
            ProbeKind::Sweep => write!(f, "sweep"),
        }
    }
}

impl FromStr for ProbeKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ping" => Ok(ProbeKind::Ping),
            "traceroute" | "trace" => Ok(ProbeKind::Traceroute),
            "dns" => Ok(ProbeKind::Dns),
            "ports" | "port" | "portscan" => Ok(ProbeKind::Ports),
            "nmap" => Ok(ProbeKind::Nmap),
            "arp" => Ok(ProbeKind::Arp),
            "sweep" | "ping-sweep" => Ok(ProbeKind::Sweep),
            other => Err(ProbeError::UnknownKind(other.to_string())),
        }
    }
}
