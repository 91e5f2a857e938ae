//! Flattening of results into one row per metric, for spreadsheet-style
//! export and for the `result_metrics` table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::probes::{arp, dns, nmap, ports, sweep, trace, TestResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub timestamp: DateTime<Utc>,
    pub test_name: String,
    pub target: String,
    pub metric: String,
    pub value: String,
    pub status: String,
    pub details: String,
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn comma_joined(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().map(render).collect::<Vec<_>>().join(","))
        .unwrap_or_default()
}

/// Rows for one result. The shape depends on the probe that produced it:
/// DNS gets one row per address, ARP one per device, sweeps one per live
/// host; everything else one per metric.
pub fn flatten(result: &TestResult) -> Vec<MetricRow> {
    let row = |target: &str, metric: &str, value: String, details: &str| MetricRow {
        timestamp: result.timestamp,
        test_name: result.test_name.clone(),
        target: target.to_string(),
        metric: metric.to_string(),
        value,
        status: result.status.as_str().to_string(),
        details: details.to_string(),
    };
    let summary = result.summary.as_str();
    let target = result.target.as_str();
    let metrics = &result.metrics;

    match result.test_name.as_str() {
        dns::TEST_NAME => {
            let mut rows: Vec<MetricRow> = metrics
                .get("ip_addresses")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .enumerate()
                .map(|(i, ip)| row(target, &format!("ip_address_{}", i + 1), render(ip), summary))
                .collect();
            let count = result.metric_u64("ip_count").unwrap_or(0);
            rows.push(row(target, "ip_count", count.to_string(), summary));
            rows
        }
        arp::TEST_NAME => metrics
            .get("devices")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|device| {
                let field = |k: &str| device.get(k).map(render).filter(|s| !s.is_empty());
                let details = format!(
                    "Interface: {}, Vendor: {}",
                    field("interface").unwrap_or_else(|| "N/A".into()),
                    field("vendor").unwrap_or_else(|| "Unknown".into()),
                );
                row(
                    &field("ip").unwrap_or_default(),
                    "mac_address",
                    field("mac").unwrap_or_default(),
                    &details,
                )
            })
            .collect(),
        sweep::TEST_NAME => metrics
            .get("alive_hosts")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|host| row(&render(host), "alive", "true".into(), summary))
            .collect(),
        nmap::TEST_NAME => {
            let mut rows: Vec<MetricRow> = ["open_count", "closed_count", "filtered_count", "hosts_up", "hosts_down"]
                .iter()
                .filter_map(|&k| metrics.get(k).map(|v| row(target, k, render(v), summary)))
                .collect();
            if metrics.contains_key("open_ports") {
                rows.push(row(target, "open_ports", comma_joined(metrics.get("open_ports")), summary));
            }
            rows
        }
        name => metrics
            .iter()
            .filter(|(k, _)| !(name == trace::TEST_NAME && k.as_str() == "hop_details"))
            .map(|(k, v)| {
                let value = if name == ports::TEST_NAME && k == "open_ports" {
                    comma_joined(Some(v))
                } else {
                    render(v)
                };
                row(target, k, value, summary)
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::TestStatus;
    use serde_json::json;

    fn result(name: &str, metrics: Value) -> TestResult {
        let Value::Object(map) = metrics else { panic!("object expected") };
        TestResult::new(name, "example.com", TestStatus::Success, Utc::now())
            .with_summary("ok")
            .with_metrics(map)
    }

    #[test]
    fn test_dns_one_row_per_address_plus_count() {
        let r = result(
            dns::TEST_NAME,
            json!({"ip_addresses": ["1.2.3.4", "::1"], "ip_count": 2, "resolved": true}),
        );
        let rows = flatten(&r);
        let pairs: Vec<(&str, &str)> = rows.iter().map(|r| (r.metric.as_str(), r.value.as_str())).collect();
        assert_eq!(pairs, [("ip_address_1", "1.2.3.4"), ("ip_address_2", "::1"), ("ip_count", "2")]);
    }

    #[test]
    fn test_trace_skips_hop_details() {
        let r = result(
            trace::TEST_NAME,
            json!({"hop_count": 3, "hop_details": [{"hop": 1}], "destination_reached": true}),
        );
        let metrics: Vec<String> = flatten(&r).into_iter().map(|r| r.metric).collect();
        assert_eq!(metrics, ["hop_count", "destination_reached"]);
    }

    #[test]
    fn test_port_list_is_comma_joined() {
        let r = result(ports::TEST_NAME, json!({"open_ports": [22, 443], "open_count": 2}));
        let rows = flatten(&r);
        assert_eq!(rows[0].value, "22,443");
        assert_eq!(rows[0].status, "success");
    }

    #[test]
    fn test_arp_and_sweep_rows_use_host_as_target() {
        let arp = result(
            arp::TEST_NAME,
            json!({"device_count": 1, "devices": [{"ip": "10.0.0.7", "mac": "AA:BB:CC:00:11:22", "interface": null, "vendor": "Apple"}]}),
        );
        let rows = flatten(&arp);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].target, "10.0.0.7");
        assert_eq!(rows[0].details, "Interface: N/A, Vendor: Apple");

        let sweep = result(sweep::TEST_NAME, json!({"alive_count": 2, "alive_hosts": ["10.0.0.1", "10.0.0.9"]}));
        let targets: Vec<String> = flatten(&sweep).into_iter().map(|r| r.target).collect();
        assert_eq!(targets, ["10.0.0.1", "10.0.0.9"]);
    }

    #[test]
    fn test_nmap_counts_then_ports() {
        let r = result(
            nmap::TEST_NAME,
            json!({"hosts_up": 1, "hosts_down": 0, "open_ports": [80], "open_count": 1, "closed_count": 0, "filtered_count": 3}),
        );
        let metrics: Vec<String> = flatten(&r).into_iter().map(|r| r.metric).collect();
        assert_eq!(
            metrics,
            ["open_count", "closed_count", "filtered_count", "hosts_up", "hosts_down", "open_ports"]
        );
    }
}
