//! Output parsers: raw tool text (or nmap XML) in, typed metrics out.
//!
//! Parsers are pure and infallible. Output that matches no known pattern
//! produces metrics with the affected keys absent or zero-valued; status
//! classification is left to the probes.

pub mod arp;
pub mod dns;
pub mod nmap;
pub mod ping;
pub mod traceroute;

pub use arp::{parse_arp, ArpDevice, ArpMetrics};
pub use dns::{parse_dns, DnsMetrics};
pub use nmap::{parse_nmap_os, parse_nmap_xml, NmapMetrics, NmapService};
pub use ping::{parse_ping, PingMetrics};
pub use traceroute::{parse_traceroute, HopDetail, TracerouteMetrics};
