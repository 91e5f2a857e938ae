//! ARP / neighbour table parsing (`arp -a`, `ip neigh show`).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::platform::OsType;

// "Interface: 192.168.1.10 --- 0xb"
static WIN_IFACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Interface:\s+(\S+)").expect("windows interface regex"));

// "  192.168.1.1           00-11-22-33-44-55     dynamic"
static WIN_ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+\.\d+\.\d+\.\d+)\s+([0-9a-fA-F-]{17})\s+(\w+)").expect("windows arp regex")
});

// "? (192.168.1.1) at 0:11:22:3:44:55 on en0 ifscope [ethernet]"
static BSD_ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\((\d+\.\d+\.\d+\.\d+)\)\s+at\s+([0-9a-fA-F]{1,2}(?::[0-9a-fA-F]{1,2}){5})\b")
        .expect("bsd arp regex")
});

static BSD_IFACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bon\s+(\S+)").expect("bsd interface regex"));

// "192.168.1.1 dev eth0 lladdr 00:11:22:33:44:55 REACHABLE"
static NEIGH_ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+\.\d+\.\d+\.\d+)\s+dev\s+(\S+)\s+lladdr\s+([0-9a-fA-F:]{17})")
        .expect("ip neigh regex")
});

static ANY_IP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+\.\d+\.\d+\.\d+)\b").expect("ip regex"));

static ANY_MAC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([0-9a-fA-F]{2}(?:[:-][0-9a-fA-F]{2}){5})\b").expect("mac regex")
});

/// A small set of well-known OUI prefixes, lowercase colon form.
const OUI_TABLE: &[(&str, &str)] = &[
    ("00:05:69", "VMware"),
    ("00:0c:29", "VMware"),
    ("00:50:56", "VMware"),
    ("08:00:27", "VirtualBox"),
    ("00:15:5d", "Microsoft"),
    ("00:1a:2b", "Cisco"),
    ("00:0d:3a", "Dell"),
    ("00:14:22", "Dell"),
    ("00:21:70", "Dell"),
    ("00:24:e8", "Dell"),
    ("00:25:64", "Dell"),
    ("00:26:b9", "Dell"),
    ("00:1c:14", "Hewlett-Packard"),
    ("00:1e:0b", "Hewlett-Packard"),
    ("00:23:7d", "Hewlett-Packard"),
    ("00:25:b3", "Hewlett-Packard"),
    ("00:1d:72", "Samsung"),
    ("00:23:39", "Samsung"),
    ("00:26:5e", "Samsung"),
    ("00:16:32", "Intel"),
    ("00:1b:21", "Intel"),
    ("00:23:14", "Intel"),
    ("00:1a:79", "Google"),
    ("00:23:6c", "Google"),
    ("00:1e:67", "Apple"),
    ("00:23:df", "Apple"),
    ("00:25:00", "Apple"),
    ("00:25:4b", "Apple"),
    ("00:26:08", "Apple"),
    ("00:26:4a", "Apple"),
    ("00:26:bb", "Apple"),
    ("00:26:ca", "Apple"),
    ("ac:de:48", "Apple"),
    ("f0:18:98", "Apple"),
    ("f4:f5:e8", "Apple"),
    ("f8:1e:df", "Apple"),
    ("fc:25:3f", "Apple"),
    ("b8:27:eb", "Raspberry Pi"),
    ("dc:a6:32", "Raspberry Pi"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArpDevice {
    pub ip: String,
    pub mac: String,
    pub interface: Option<String>,
    pub vendor: Option<String>,
}

impl ArpDevice {
    fn new(ip: &str, mac: &str, interface: Option<String>) -> Self {
        let mac = normalize_mac(mac);
        Self {
            ip: ip.to_string(),
            vendor: lookup_oui(&mac).map(str::to_string),
            mac,
            interface,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArpMetrics {
    pub device_count: usize,
    pub devices: Vec<ArpDevice>,
}

/// Uppercase, colon-separated, every octet two digits wide.
/// BSD `arp -a` drops leading zeros ("0:11:22:3:44:55").
pub fn normalize_mac(mac: &str) -> String {
    mac.split([':', '-'])
        .map(|octet| format!("{:0>2}", octet.to_ascii_uppercase()))
        .collect::<Vec<_>>()
        .join(":")
}

/// Vendor for the first three octets of `mac`, in any case or separator.
pub fn lookup_oui(mac: &str) -> Option<&'static str> {
    let normalized = normalize_mac(mac).to_ascii_lowercase();
    let oui = normalized.get(..8)?;
    OUI_TABLE
        .iter()
        .find(|(prefix, _)| *prefix == oui)
        .map(|(_, vendor)| *vendor)
}

pub fn parse_arp(output: &str, os: OsType) -> ArpMetrics {
    let devices = if os.is_windows() {
        parse_windows(output)
    } else {
        parse_unix(output)
    };
    ArpMetrics {
        device_count: devices.len(),
        devices,
    }
}

fn parse_windows(output: &str) -> Vec<ArpDevice> {
    let mut devices = Vec::new();
    let mut interface: Option<String> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(caps) = WIN_IFACE_RE.captures(trimmed) {
            interface = Some(caps[1].to_string());
            continue;
        }
        if let Some(caps) = WIN_ENTRY_RE.captures(trimmed) {
            devices.push(ArpDevice::new(&caps[1], &caps[2], interface.clone()));
        }
    }
    devices
}

fn parse_unix(output: &str) -> Vec<ArpDevice> {
    let mut devices = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = BSD_ENTRY_RE.captures(line) {
            let interface = BSD_IFACE_RE.captures(line).map(|c| c[1].to_string());
            devices.push(ArpDevice::new(&caps[1], &caps[2], interface));
            continue;
        }

        if let Some(caps) = NEIGH_ENTRY_RE.captures(line) {
            devices.push(ArpDevice::new(&caps[1], &caps[3], Some(caps[2].to_string())));
            continue;
        }

        if let (Some(ip), Some(mac)) = (ANY_IP_RE.captures(line), ANY_MAC_RE.captures(line)) {
            devices.push(ArpDevice::new(&ip[1], &mac[1], None));
        }
    }
    devices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_ip_neigh() {
        let out = "192.168.1.1 dev eth0 lladdr 00:50:56:c0:00:08 REACHABLE
192.168.1.20 dev eth0 lladdr b8:27:eb:12:34:56 STALE
192.168.1.30 dev eth0 FAILED
";
        let m = parse_arp(out, OsType::Linux);
        assert_eq!(m.device_count, 2);
        assert_eq!(m.devices[0].mac, "00:50:56:C0:00:08");
        assert_eq!(m.devices[0].interface.as_deref(), Some("eth0"));
        assert_eq!(m.devices[0].vendor.as_deref(), Some("VMware"));
        assert_eq!(m.devices[1].vendor.as_deref(), Some("Raspberry Pi"));
    }

    #[test]
    fn test_macos_pads_short_octets() {
        let out = "? (192.168.1.1) at 0:1e:67:3:44:55 on en0 ifscope [ethernet]
? (192.168.1.99) at (incomplete) on en0 ifscope [ethernet]
";
        let m = parse_arp(out, OsType::MacOs);
        assert_eq!(m.device_count, 1);
        let dev = &m.devices[0];
        assert_eq!(dev.ip, "192.168.1.1");
        assert_eq!(dev.mac, "00:1E:67:03:44:55");
        assert_eq!(dev.interface.as_deref(), Some("en0"));
        assert_eq!(dev.vendor.as_deref(), Some("Apple"));
    }

    #[test]
    fn test_windows_interface_headers() {
        let out = "
Interface: 192.168.1.10 --- 0xb
  Internet Address      Physical Address      Type
  192.168.1.1           00-1a-2b-33-44-55     dynamic
  192.168.1.255         ff-ff-ff-ff-ff-ff     static

Interface: 10.0.0.5 --- 0x4
  10.0.0.1              08-00-27-aa-bb-cc     dynamic
";
        let m = parse_arp(out, OsType::Windows);
        assert_eq!(m.device_count, 3);
        assert_eq!(m.devices[0].mac, "00:1A:2B:33:44:55");
        assert_eq!(m.devices[0].interface.as_deref(), Some("192.168.1.10"));
        assert_eq!(m.devices[0].vendor.as_deref(), Some("Cisco"));
        assert_eq!(m.devices[2].interface.as_deref(), Some("10.0.0.5"));
        assert_eq!(m.devices[2].vendor.as_deref(), Some("VirtualBox"));
        assert!(m.devices[1].vendor.is_none());
    }

    #[test]
    fn test_fallback_line() {
        let m = parse_arp("gw 10.1.1.1 aa-bb-cc-dd-ee-ff something\n", OsType::Linux);
        assert_eq!(m.device_count, 1);
        assert_eq!(m.devices[0].mac, "AA:BB:CC:DD:EE:FF");
        assert!(m.devices[0].interface.is_none());
    }

    #[test]
    fn test_lookup_oui_any_case() {
        assert_eq!(lookup_oui("00-0C-29-01-02-03"), Some("VMware"));
        assert_eq!(lookup_oui("00:0c:29:01:02:03"), Some("VMware"));
        assert_eq!(lookup_oui("12:34"), None);
    }
}
