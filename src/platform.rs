//! Per-OS command templates.
//!
//! Each supported OS family gets one [`Toolchain`] implementation that knows
//! how to invoke the system tools and which parser dialect reads their
//! output. The toolchain is picked once per process by [`toolchain`]; probes
//! never branch on the OS themselves.

use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::exec::CommandSpec;
use crate::parsers::arp::{self, ArpMetrics};
use crate::parsers::dns::{self, DnsMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OsType {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl OsType {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            OsType::Windows
        } else if cfg!(target_os = "macos") {
            OsType::MacOs
        } else if cfg!(target_os = "linux") {
            OsType::Linux
        } else {
            OsType::Other
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, OsType::Windows)
    }
}

impl std::fmt::Display for OsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsType::Linux => write!(f, "Linux"),
            OsType::MacOs => write!(f, "Darwin"),
            OsType::Windows => write!(f, "Windows"),
            OsType::Other => write!(f, "Unknown"),
        }
    }
}

/// Command arguments and parser entry points for one OS family.
pub trait Toolchain: Send + Sync {
    fn os(&self) -> OsType;

    /// Echo request burst used by the ping probe.
    fn ping(&self, target: &str, count: u32) -> CommandSpec;

    /// Single echo with a per-reply wait, used by the ping sweep.
    fn ping_once(&self, host: &str, wait: Duration) -> CommandSpec;

    fn traceroute(&self, target: &str, max_hops: u32) -> CommandSpec;

    fn dns_lookup(&self, target: &str) -> CommandSpec;

    fn arp_table(&self) -> CommandSpec;

    fn parse_dns(&self, output: &str) -> DnsMetrics {
        dns::parse_dns(output, self.os())
    }

    fn parse_arp(&self, output: &str) -> ArpMetrics {
        arp::parse_arp(output, self.os())
    }
}

/// Linux, macOS and the BSDs.
#[derive(Debug, Clone, Copy)]
pub struct UnixTools {
    os: OsType,
    /// `ip neigh` is preferred over `arp -a` when iproute2 is installed.
    has_iproute: bool,
}

impl UnixTools {
    pub const fn new(os: OsType, has_iproute: bool) -> Self {
        Self { os, has_iproute }
    }

    pub fn detect() -> Self {
        Self::new(OsType::current(), which::which("ip").is_ok())
    }
}

impl Toolchain for UnixTools {
    fn os(&self) -> OsType {
        self.os
    }

    fn ping(&self, target: &str, count: u32) -> CommandSpec {
        CommandSpec::new("ping", ["-c".to_string(), count.to_string(), target.to_string()])
    }

    fn ping_once(&self, host: &str, wait: Duration) -> CommandSpec {
        let wait_secs = wait.as_secs().max(1);
        CommandSpec::new(
            "ping",
            ["-c".to_string(), "1".to_string(), "-W".to_string(), wait_secs.to_string(), host.to_string()],
        )
    }

    fn traceroute(&self, target: &str, max_hops: u32) -> CommandSpec {
        CommandSpec::new(
            "traceroute",
            ["-n".to_string(), "-m".to_string(), max_hops.to_string(), target.to_string()],
        )
    }

    fn dns_lookup(&self, target: &str) -> CommandSpec {
        CommandSpec::new("dig", ["+short", target])
    }

    fn arp_table(&self) -> CommandSpec {
        if self.has_iproute {
            CommandSpec::new("ip", ["neigh", "show"])
        } else {
            CommandSpec::new("arp", ["-a"])
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsTools;

impl Toolchain for WindowsTools {
    fn os(&self) -> OsType {
        OsType::Windows
    }

    fn ping(&self, target: &str, count: u32) -> CommandSpec {
        CommandSpec::new("ping", ["-n".to_string(), count.to_string(), target.to_string()])
    }

    fn ping_once(&self, host: &str, wait: Duration) -> CommandSpec {
        CommandSpec::new(
            "ping",
            ["-n".to_string(), "1".to_string(), "-w".to_string(), wait.as_millis().to_string(), host.to_string()],
        )
    }

    fn traceroute(&self, target: &str, max_hops: u32) -> CommandSpec {
        CommandSpec::new(
            "tracert",
            ["-d".to_string(), "-h".to_string(), max_hops.to_string(), target.to_string()],
        )
    }

    fn dns_lookup(&self, target: &str) -> CommandSpec {
        CommandSpec::new("nslookup", [target])
    }

    fn arp_table(&self) -> CommandSpec {
        CommandSpec::new("arp", ["-a"])
    }
}

static TOOLCHAIN: OnceCell<Box<dyn Toolchain>> = OnceCell::new();

/// The toolchain for the running OS, detected on first use.
pub fn toolchain() -> &'static dyn Toolchain {
    TOOLCHAIN
        .get_or_init(|| -> Box<dyn Toolchain> {
            if OsType::current().is_windows() {
                Box::new(WindowsTools)
            } else {
                Box::new(UnixTools::detect())
            }
        })
        .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_commands() {
        let tools = UnixTools::new(OsType::Linux, true);
        assert_eq!(tools.ping("8.8.8.8", 4).to_string(), "ping -c 4 8.8.8.8");
        assert_eq!(tools.traceroute("8.8.8.8", 15).to_string(), "traceroute -n -m 15 8.8.8.8");
        assert_eq!(tools.dns_lookup("example.com").to_string(), "dig +short example.com");
        assert_eq!(tools.arp_table().to_string(), "ip neigh show");
        assert_eq!(
            tools.ping_once("10.0.0.1", Duration::from_millis(500)).to_string(),
            "ping -c 1 -W 1 10.0.0.1"
        );

        let bsd = UnixTools::new(OsType::MacOs, false);
        assert_eq!(bsd.arp_table().to_string(), "arp -a");
    }

    #[test]
    fn test_windows_commands() {
        let tools = WindowsTools;
        assert_eq!(tools.ping("8.8.8.8", 4).to_string(), "ping -n 4 8.8.8.8");
        assert_eq!(tools.traceroute("8.8.8.8", 15).to_string(), "tracert -d -h 15 8.8.8.8");
        assert_eq!(tools.dns_lookup("example.com").to_string(), "nslookup example.com");
        assert_eq!(
            tools.ping_once("10.0.0.1", Duration::from_secs(1)).to_string(),
            "ping -n 1 -w 1000 10.0.0.1"
        );
    }

    #[test]
    fn test_windows_toolchain_uses_windows_dns_dialect() {
        let out = "Server:  dns.google\nAddress:  8.8.8.8\n\nName:    example.com\nAddress:  93.184.216.34\n";
        let m = WindowsTools.parse_dns(out);
        assert_eq!(m.ip_addresses, vec!["93.184.216.34"]);
    }
}
