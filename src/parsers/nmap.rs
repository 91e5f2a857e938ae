//! nmap `-oX -` report parsing.
//!
//! The report is walked as a stream of events with a stack of open element
//! names. Any XML error, or a document that ends with elements still open,
//! produces the zero-valued metrics shape instead of an error.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NmapService {
    pub port: u16,
    pub state: String,
    pub service: String,
    pub product: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NmapMetrics {
    pub hosts_up: u32,
    pub hosts_down: u32,
    pub open_ports: Vec<u16>,
    pub closed_ports: Vec<u16>,
    pub filtered_ports: Vec<u16>,
    pub open_count: usize,
    pub closed_count: usize,
    pub filtered_count: usize,
    pub services: Vec<NmapService>,
}

enum Step<'a> {
    Open {
        parents: &'a [String],
        elem: &'a BytesStart<'a>,
        empty: bool,
    },
    Close {
        name: &'a str,
    },
}

fn walk<F>(xml: &str, mut visit: F) -> Option<()>
where
    F: FnMut(Step<'_>),
{
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut stack: Vec<String> = Vec::new();

    loop {
        match reader.read_event().ok()? {
            Event::Start(e) => {
                visit(Step::Open { parents: &stack, elem: &e, empty: false });
                stack.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Event::Empty(e) => {
                visit(Step::Open { parents: &stack, elem: &e, empty: true });
            }
            Event::End(_) => {
                let name = stack.pop()?;
                visit(Step::Close { name: &name });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    stack.is_empty().then_some(())
}

fn under(parents: &[String], path: &[&str]) -> bool {
    parents.len() >= path.len()
        && parents[parents.len() - path.len()..]
            .iter()
            .zip(path)
            .all(|(a, b)| a == b)
}

fn attr(elem: &BytesStart<'_>, key: &str) -> Option<String> {
    elem.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

pub fn parse_nmap_xml(xml: &str) -> NmapMetrics {
    if xml.trim().is_empty() {
        return NmapMetrics::default();
    }

    let mut metrics = NmapMetrics::default();
    let mut current: Option<NmapService> = None;

    let walked = walk(xml, |step| match step {
        Step::Open { parents, elem, empty } => match elem.name().as_ref() {
            b"hosts" if under(parents, &["runstats"]) => {
                metrics.hosts_up = attr(elem, "up").and_then(|v| v.parse().ok()).unwrap_or(0);
                metrics.hosts_down = attr(elem, "down").and_then(|v| v.parse().ok()).unwrap_or(0);
            }
            b"port" if under(parents, &["host", "ports"]) => {
                let port = attr(elem, "portid").and_then(|v| v.parse::<u16>().ok());
                current = port.map(|port| NmapService { port, ..Default::default() });
                if empty {
                    metrics.services.extend(current.take());
                }
            }
            b"state" if under(parents, &["port"]) => {
                if let Some(svc) = current.as_mut() {
                    svc.state = attr(elem, "state").unwrap_or_default();
                }
            }
            b"service" if under(parents, &["port"]) => {
                if let Some(svc) = current.as_mut() {
                    svc.service = attr(elem, "name").unwrap_or_default();
                    svc.product = attr(elem, "product").unwrap_or_default();
                    svc.version = attr(elem, "version").unwrap_or_default();
                }
            }
            _ => {}
        },
        Step::Close { name } => {
            if name == "port" {
                metrics.services.extend(current.take());
            }
        }
    });

    if walked.is_none() {
        return NmapMetrics::default();
    }

    for svc in &metrics.services {
        match svc.state.as_str() {
            "open" => metrics.open_ports.push(svc.port),
            "closed" => metrics.closed_ports.push(svc.port),
            "filtered" => metrics.filtered_ports.push(svc.port),
            _ => {}
        }
    }
    metrics.open_ports.sort_unstable();
    metrics.closed_ports.sort_unstable();
    metrics.filtered_ports.sort_unstable();
    metrics.open_count = metrics.open_ports.len();
    metrics.closed_count = metrics.closed_ports.len();
    metrics.filtered_count = metrics.filtered_ports.len();

    metrics
}

/// Best OS guess: the first named `host/os/osmatch`.
pub fn parse_nmap_os(xml: &str) -> Option<String> {
    if xml.trim().is_empty() {
        return None;
    }

    let mut found: Option<String> = None;
    walk(xml, |step| {
        if let Step::Open { parents, elem, .. } = step {
            if found.is_none()
                && elem.name().as_ref() == b"osmatch"
                && under(parents, &["host", "os"])
            {
                found = attr(elem, "name").filter(|n| !n.is_empty());
            }
        }
    })?;
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<nmaprun scanner="nmap" args="nmap -oX - -sT -sV 192.168.1.1" start="1700000000" version="7.94">
<host starttime="1700000000" endtime="1700000010">
<status state="up" reason="conn-refused"/>
<address addr="192.168.1.1" addrtype="ipv4"/>
<ports>
<extraports state="closed" count="995"/>
<port protocol="tcp" portid="443"><state state="open" reason="syn-ack"/><service name="https" product="nginx" version="1.24.0"/></port>
<port protocol="tcp" portid="22"><state state="open" reason="syn-ack"/><service name="ssh" product="OpenSSH" version="9.6"/></port>
<port protocol="tcp" portid="23"><state state="closed" reason="conn-refused"/><service name="telnet"/></port>
<port protocol="tcp" portid="8080"><state state="filtered" reason="no-response"/></port>
</ports>
<os><osmatch name="Linux 5.0 - 5.14" accuracy="98"/><osmatch name="Linux 4.15" accuracy="90"/></os>
</host>
<runstats><finished time="1700000010" elapsed="10.2"/><hosts up="1" down="0" total="1"/></runstats>
</nmaprun>
"#;

    #[test]
    fn test_parse_report() {
        let m = parse_nmap_xml(REPORT);
        assert_eq!(m.hosts_up, 1);
        assert_eq!(m.hosts_down, 0);
        assert_eq!(m.open_ports, vec![22, 443]);
        assert_eq!(m.closed_ports, vec![23]);
        assert_eq!(m.filtered_ports, vec![8080]);
        assert_eq!((m.open_count, m.closed_count, m.filtered_count), (2, 1, 1));
        assert_eq!(m.services.len(), 4);
        assert_eq!(
            m.services[1],
            NmapService {
                port: 22,
                state: "open".into(),
                service: "ssh".into(),
                product: "OpenSSH".into(),
                version: "9.6".into(),
            }
        );
        assert_eq!(m.services[3].service, "");
    }

    #[test]
    fn test_malformed_yields_zero_shape() {
        assert_eq!(parse_nmap_xml(""), NmapMetrics::default());
        assert_eq!(parse_nmap_xml("not xml at all"), NmapMetrics::default());
        assert_eq!(parse_nmap_xml("<nmaprun><host><ports><port portid=\"22\">"), NmapMetrics::default());
        assert_eq!(parse_nmap_xml("<nmaprun></host>"), NmapMetrics::default());
    }

    #[test]
    fn test_os_guess() {
        assert_eq!(parse_nmap_os(REPORT).as_deref(), Some("Linux 5.0 - 5.14"));
        assert_eq!(parse_nmap_os("<nmaprun><host/></nmaprun>"), None);
        assert_eq!(parse_nmap_os("garbage <"), None);
    }
}
