//! netscope -- network diagnostics from the command line.
//!
//! The crate wraps the system's own tools (ping, traceroute, dig/nslookup,
//! arp, nmap) and a native TCP connect scanner behind one [`probes::Probe`]
//! interface, and runs them concurrently with per-task deadlines, rate
//! limiting and periodic monitoring.

pub mod config;
pub mod exec;
pub mod parallel;
pub mod parsers;
pub mod platform;
pub mod probes;
pub mod report;
pub mod storage;
pub mod system;
