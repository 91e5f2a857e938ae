//! Target validation and the `localhost`, `gateway` and `dns` shortcuts.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::exec::{CommandRunner, CommandSpec, SystemRunner};
use crate::platform::OsType;

pub const FALLBACK_GATEWAY: &str = "192.168.1.1";
pub const FALLBACK_DNS: &str = "8.8.8.8";
const LOCALHOST: &str = "127.0.0.1";
const RESOLV_CONF: &str = "/etc/resolv.conf";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, PartialEq)]
pub enum TargetError {
    #[error("target is empty")]
    Empty,

    #[error("target must not start with '-': {0}")]
    LooksLikeOption(String),

    #[error("target contains whitespace: {0:?}")]
    Whitespace(String),
}

/// Reject targets that would be misread by the tools they are passed to.
pub fn validate_target(target: &str) -> Result<&str, TargetError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(TargetError::Empty);
    }
    if target.starts_with('-') {
        return Err(TargetError::LooksLikeOption(target.to_string()));
    }
    if target.chars().any(char::is_whitespace) {
        return Err(TargetError::Whitespace(target.to_string()));
    }
    Ok(target)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Localhost,
    Gateway,
    DnsServer,
}

impl Shortcut {
    pub fn parse(target: &str) -> Option<Self> {
        match target.trim().to_ascii_lowercase().as_str() {
            "localhost" | "local" => Some(Shortcut::Localhost),
            "gateway" | "router" => Some(Shortcut::Gateway),
            "dns" | "dns-server" => Some(Shortcut::DnsServer),
            _ => None,
        }
    }
}

/// `default via 192.168.1.1 dev eth0 ...`
pub fn parse_ip_route(output: &str) -> Option<Ipv4Addr> {
    output
        .lines()
        .filter(|l| l.contains("default via"))
        .find_map(|l| token_after(l, "via"))
}

/// macOS `route -n get default`: a `gateway: 10.0.0.1` line.
pub fn parse_route_get(output: &str) -> Option<Ipv4Addr> {
    output
        .lines()
        .filter_map(|l| l.trim().strip_prefix("gateway:"))
        .find_map(|v| v.trim().parse().ok())
}

/// `netstat -rn`: the second column of the `default` or `0.0.0.0` row.
pub fn parse_netstat(output: &str) -> Option<Ipv4Addr> {
    output
        .lines()
        .filter(|l| l.starts_with("default") || l.starts_with("0.0.0.0"))
        .find_map(|l| l.split_whitespace().nth(1)?.parse().ok())
}

/// Windows `route print 0.0.0.0`: the column after the `0.0.0.0` destination.
pub fn parse_route_print(output: &str) -> Option<Ipv4Addr> {
    output
        .lines()
        .filter(|l| l.contains("0.0.0.0") && !l.contains("On-link"))
        .find_map(|l| token_after(l, "0.0.0.0"))
}

/// The first IPv4 `nameserver` line.
pub fn parse_resolv_conf(content: &str) -> Option<Ipv4Addr> {
    content
        .lines()
        .filter(|l| l.starts_with("nameserver"))
        .find_map(|l| l.split_whitespace().nth(1)?.parse().ok())
}

/// Windows `ipconfig /all`: the value of the first `DNS Servers` line.
pub fn parse_ipconfig_dns(output: &str) -> Option<Ipv4Addr> {
    output
        .lines()
        .filter(|l| l.contains("DNS Servers") || l.contains("DNS servers"))
        .find_map(|l| l.split_once(':')?.1.trim().parse().ok())
}

type RouteParser = fn(&str) -> Option<Ipv4Addr>;

fn token_after(line: &str, marker: &str) -> Option<Ipv4Addr> {
    let mut parts = line.split_whitespace();
    while let Some(part) = parts.next() {
        if part == marker {
            let next = parts.clone().next().and_then(|t| t.parse::<Ipv4Addr>().ok());
            if let Some(ip) = next.filter(|ip| !ip.is_unspecified()) {
                return Some(ip);
            }
        }
    }
    None
}

/// Turns user-supplied targets into something the probes can use.
pub struct TargetResolver {
    runner: Arc<dyn CommandRunner>,
    os: OsType,
    resolv_conf: String,
}

impl TargetResolver {
    pub fn new(runner: Arc<dyn CommandRunner>, os: OsType) -> Self {
        Self {
            runner,
            os,
            resolv_conf: RESOLV_CONF.to_string(),
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemRunner), OsType::current())
    }

    pub fn with_resolv_conf(mut self, path: impl Into<String>) -> Self {
        self.resolv_conf = path.into();
        self
    }

    /// Expand a shortcut or validate a literal target.
    pub async fn resolve(&self, target: &str) -> Result<String, TargetError> {
        let target = validate_target(target)?;
        let resolved = match Shortcut::parse(target) {
            None => return Ok(target.to_string()),
            Some(Shortcut::Localhost) => LOCALHOST.to_string(),
            Some(Shortcut::Gateway) => self.default_gateway().await,
            Some(Shortcut::DnsServer) => self.dns_server().await,
        };
        info!(shortcut = %target, resolved = %resolved, "Resolved target shortcut");
        Ok(resolved)
    }

    pub async fn resolve_all(&self, targets: &[String]) -> Result<Vec<String>, TargetError> {
        let mut out = Vec::with_capacity(targets.len());
        for t in targets {
            out.push(self.resolve(t).await?);
        }
        Ok(out)
    }

    /// Falls back to `192.168.1.1` when no route table source answers.
    pub async fn default_gateway(&self) -> String {
        let attempts: Vec<(CommandSpec, RouteParser)> = if self.os.is_windows() {
            vec![(CommandSpec::new("route", ["print", "0.0.0.0"]), parse_route_print as RouteParser)]
        } else {
            vec![
                (CommandSpec::new("ip", ["route", "show", "default"]), parse_ip_route as RouteParser),
                (CommandSpec::new("route", ["-n", "get", "default"]), parse_route_get as RouteParser),
                (CommandSpec::new("netstat", ["-rn"]), parse_netstat as RouteParser),
            ]
        };

        for (spec, parse) in attempts {
            let out = self.runner.run(&spec, LOOKUP_TIMEOUT).await;
            if !out.success {
                debug!(command = %out.command, "Gateway lookup failed, trying next source");
                continue;
            }
            if let Some(ip) = parse(&out.stdout) {
                return ip.to_string();
            }
        }
        warn!(fallback = FALLBACK_GATEWAY, "Could not detect default gateway");
        FALLBACK_GATEWAY.to_string()
    }

    /// Falls back to `8.8.8.8` when no nameserver is configured.
    pub async fn dns_server(&self) -> String {
        let found = if self.os.is_windows() {
            let out = self
                .runner
                .run(&CommandSpec::new("ipconfig", ["/all"]), LOOKUP_TIMEOUT)
                .await;
            out.success.then(|| parse_ipconfig_dns(&out.stdout)).flatten()
        } else {
            match tokio::fs::read_to_string(&self.resolv_conf).await {
                Ok(content) => parse_resolv_conf(&content),
                Err(e) => {
                    debug!(path = %self.resolv_conf, error = %e, "Cannot read resolver config");
                    None
                }
            }
        };

        match found {
            Some(ip) => ip.to_string(),
            None => {
                warn!(fallback = FALLBACK_DNS, "Could not detect DNS server");
                FALLBACK_DNS.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::testing::ScriptedRunner;
    use std::io::Write;

    #[test]
    fn test_validate_target() {
        assert_eq!(validate_target("  example.com "), Ok("example.com"));
        assert_eq!(validate_target(""), Err(TargetError::Empty));
        assert!(matches!(validate_target("-oX"), Err(TargetError::LooksLikeOption(_))));
        assert!(matches!(validate_target("a b"), Err(TargetError::Whitespace(_))));
    }

    #[test]
    fn test_shortcut_aliases() {
        assert_eq!(Shortcut::parse("LOCAL"), Some(Shortcut::Localhost));
        assert_eq!(Shortcut::parse("router"), Some(Shortcut::Gateway));
        assert_eq!(Shortcut::parse("dns-server"), Some(Shortcut::DnsServer));
        assert_eq!(Shortcut::parse("dns.google"), None);
    }

    #[test]
    fn test_route_parsers() {
        let ip = "default via 10.1.0.1 dev wlan0 proto dhcp metric 600\n10.1.0.0/24 dev wlan0\n";
        assert_eq!(parse_ip_route(ip), Some(Ipv4Addr::new(10, 1, 0, 1)));

        let mac = "   route to: default\ndestination: default\n    gateway: 192.168.0.254\n  interface: en0\n";
        assert_eq!(parse_route_get(mac), Some(Ipv4Addr::new(192, 168, 0, 254)));

        let netstat = "Routing tables\n\nInternet:\nDestination        Gateway            Flags\ndefault            172.16.0.1         UGScg\n";
        assert_eq!(parse_netstat(netstat), Some(Ipv4Addr::new(172, 16, 0, 1)));

        let win = "Network Destination        Netmask          Gateway       Interface  Metric\n          0.0.0.0          0.0.0.0      192.168.1.254    192.168.1.20     25\n";
        assert_eq!(parse_route_print(win), Some(Ipv4Addr::new(192, 168, 1, 254)));
        assert_eq!(parse_route_print("          0.0.0.0          0.0.0.0         On-link  10.0.0.2 5"), None);
    }

    #[test]
    fn test_dns_parsers() {
        let conf = "# generated\nsearch lan\nnameserver fe80::1\nnameserver 192.168.1.53\n";
        assert_eq!(parse_resolv_conf(conf), Some(Ipv4Addr::new(192, 168, 1, 53)));

        let ipconfig = "   DNS Servers . . . . . . . . . . . : 1.1.1.1\n                                       1.0.0.1\n";
        assert_eq!(parse_ipconfig_dns(ipconfig), Some(Ipv4Addr::new(1, 1, 1, 1)));
    }

    #[tokio::test]
    async fn test_gateway_falls_through_to_netstat() {
        let runner = ScriptedRunner::default()
            .on("ip route", 0, "10.0.0.0/8 dev eth0\n")
            .on("netstat -rn", 0, "default 10.9.8.7 UG 0 0 en0\n");
        let resolver = TargetResolver::new(Arc::new(runner), OsType::Linux);
        assert_eq!(resolver.resolve("gateway").await.unwrap(), "10.9.8.7");
    }

    #[tokio::test]
    async fn test_gateway_fallback_when_nothing_answers() {
        let resolver = TargetResolver::new(Arc::new(ScriptedRunner::default()), OsType::Windows);
        assert_eq!(resolver.default_gateway().await, FALLBACK_GATEWAY);
    }

    #[tokio::test]
    async fn test_dns_shortcut_reads_resolv_conf() {
        let mut conf = tempfile::NamedTempFile::new().unwrap();
        writeln!(conf, "nameserver 9.9.9.9").unwrap();
        let resolver = TargetResolver::new(Arc::new(ScriptedRunner::default()), OsType::Linux)
            .with_resolv_conf(conf.path().display().to_string());
        assert_eq!(resolver.resolve("DNS").await.unwrap(), "9.9.9.9");

        let missing = TargetResolver::new(Arc::new(ScriptedRunner::default()), OsType::MacOs)
            .with_resolv_conf("/nonexistent/resolv.conf");
        assert_eq!(missing.dns_server().await, FALLBACK_DNS);
    }

    #[tokio::test]
    async fn test_literal_targets_pass_through() {
        let resolver = TargetResolver::new(Arc::new(ScriptedRunner::default()), OsType::Linux);
        let out = resolver
            .resolve_all(&["localhost".to_string(), "example.com".to_string()])
            .await
            .unwrap();
        assert_eq!(out, ["127.0.0.1", "example.com"]);
    }
}
