//! `dig +short` and `nslookup` answer parsing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::platform::OsType;

static IPV4_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{1,3}\.){3}\d{1,3}\b").expect("ipv4 regex"));

// Shape check only: 2001:db8::1, fe80::1, ::1
static IPV6_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[0-9a-fA-F]{1,4}:){1,7}[0-9a-fA-F]{1,4}\b|::1|\b::\b").expect("ipv6 regex")
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsMetrics {
    pub ip_addresses: Vec<String>,
    pub ipv4_addresses: Vec<String>,
    pub ipv6_addresses: Vec<String>,
    pub resolved: bool,
    pub ip_count: usize,
    pub ipv4_count: usize,
    pub ipv6_count: usize,
    pub has_ipv4: bool,
    pub has_ipv6: bool,
}

impl DnsMetrics {
    fn from_addresses(ipv4: Vec<String>, ipv6: Vec<String>, all: Vec<String>) -> Self {
        Self {
            resolved: !all.is_empty(),
            ip_count: all.len(),
            ipv4_count: ipv4.len(),
            ipv6_count: ipv6.len(),
            has_ipv4: !ipv4.is_empty(),
            has_ipv6: !ipv6.is_empty(),
            ip_addresses: all,
            ipv4_addresses: ipv4,
            ipv6_addresses: ipv6,
        }
    }
}

#[derive(Default)]
struct Collector {
    all: Vec<String>,
    ipv4: Vec<String>,
    ipv6: Vec<String>,
}

impl Collector {
    fn push(&mut self, token: &str) {
        if IPV4_RE.is_match(token) {
            self.all.push(token.to_string());
            self.ipv4.push(token.to_string());
        } else if IPV6_RE.is_match(token) {
            self.all.push(token.to_string());
            self.ipv6.push(token.to_string());
        }
    }

    fn finish(self) -> DnsMetrics {
        DnsMetrics::from_addresses(self.ipv4, self.ipv6, self.all)
    }
}

pub fn parse_dns(output: &str, os: OsType) -> DnsMetrics {
    if os.is_windows() {
        parse_nslookup(output)
    } else {
        parse_dig_short(output)
    }
}

/// One answer per line; CNAME targets and comments fall through both
/// address checks.
fn parse_dig_short(output: &str) -> DnsMetrics {
    let mut c = Collector::default();
    for line in output.trim().lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        c.push(line);
    }
    c.finish()
}

/// nslookup prints the resolver first ("Server:" / "Address:"); answers
/// only start after the "Name:" line. Multi-address answers put the first
/// address after "Addresses:" and the rest on indented lines.
fn parse_nslookup(output: &str) -> DnsMetrics {
    let mut c = Collector::default();
    let mut in_answer = false;
    let mut in_address_list = false;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            in_address_list = false;
            continue;
        }

        let Some((label, value)) = trimmed.split_once(':') else {
            if in_address_list {
                c.push(trimmed);
            }
            continue;
        };

        // IPv6 continuation lines contain colons too.
        if in_address_list
            && line.starts_with(char::is_whitespace)
            && !label.contains(' ')
            && IPV6_RE.is_match(trimmed)
        {
            c.push(trimmed);
            continue;
        }

        in_address_list = false;
        match label.trim() {
            "Name" => in_answer = true,
            "Address" | "Addresses" if in_answer => {
                in_address_list = label.trim() == "Addresses";
                let value = value.trim();
                if !value.is_empty() {
                    c.push(value);
                }
            }
            _ => {}
        }
    }

    c.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dig_dual_stack() {
        let m = parse_dns("93.184.216.34\n2606:2800:220:1:248:1893:25c8:1946\n", OsType::Linux);
        assert_eq!(m.ip_count, 2);
        assert_eq!(m.ipv4_count, 1);
        assert_eq!(m.ipv6_count, 1);
        assert!(m.has_ipv4);
        assert!(m.has_ipv6);
        assert!(m.resolved);
        assert_eq!(m.ipv4_addresses, vec!["93.184.216.34"]);
    }

    #[test]
    fn test_dig_skips_cname_lines() {
        let m = parse_dns("www.example.com.cdn.net.\n151.101.1.57\n", OsType::MacOs);
        assert_eq!(m.ip_addresses, vec!["151.101.1.57"]);
    }

    #[test]
    fn test_dig_empty_is_unresolved() {
        let m = parse_dns("", OsType::Linux);
        assert!(!m.resolved);
        assert_eq!(m.ip_count, 0);
        assert!(!m.has_ipv4 && !m.has_ipv6);
    }

    #[test]
    fn test_nslookup_skips_server_block() {
        let out = "Server:  dns.google
Address:  8.8.8.8

Non-authoritative answer:
Name:    example.com
Address:  93.184.216.34
";
        let m = parse_dns(out, OsType::Windows);
        assert_eq!(m.ip_addresses, vec!["93.184.216.34"]);
    }

    #[test]
    fn test_nslookup_multi_address_answer() {
        let out = "Server:  UnKnown
Address:  192.168.1.1

Non-authoritative answer:
Name:    example.com
Addresses:  2606:2800:220:1:248:1893:25c8:1946
          93.184.216.34
";
        let m = parse_dns(out, OsType::Windows);
        assert_eq!(m.ipv6_addresses, vec!["2606:2800:220:1:248:1893:25c8:1946"]);
        assert_eq!(m.ipv4_addresses, vec!["93.184.216.34"]);
        assert_eq!(m.ip_count, 2);
    }

    #[test]
    fn test_nslookup_nxdomain() {
        let out = "Server:  dns.google\nAddress:  8.8.8.8\n\n*** dns.google can't find nowhere.invalid: Non-existent domain\n";
        let m = parse_dns(out, OsType::Windows);
        assert!(!m.resolved);
    }
}
