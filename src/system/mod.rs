//! Host facts and external tool availability.

pub mod targets;

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::exec::{CommandRunner, CommandSpec};
use crate::platform::OsType;

/// Tools the everyday probes shell out to, by their Unix names.
pub const REQUIRED_TOOLS: [&str; 3] = ["ping", "traceroute", "dig"];

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInfo {
    pub os_type: OsType,
    pub platform: String,
    pub hostname: String,
    pub netscope_version: String,
}

/// Collect host facts. Anything that cannot be determined is reported as
/// `unknown` rather than failing.
pub async fn detect_system(runner: &dyn CommandRunner, os: OsType) -> SystemInfo {
    let hostname = match std::env::var("HOSTNAME").or_else(|_| std::env::var("COMPUTERNAME")) {
        Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => first_line(runner, CommandSpec::new("hostname", Vec::<String>::new()))
            .await
            .unwrap_or_else(|| "unknown".to_string()),
    };

    let kernel = if os.is_windows() {
        None
    } else {
        first_line(runner, CommandSpec::new("uname", ["-sr"])).await
    };
    let platform = match kernel {
        Some(kernel) => format!("{}-{}", kernel.replace(' ', "-"), std::env::consts::ARCH),
        None => format!("{}-{}", os, std::env::consts::ARCH),
    };

    SystemInfo {
        os_type: os,
        platform,
        hostname,
        netscope_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

async fn first_line(runner: &dyn CommandRunner, spec: CommandSpec) -> Option<String> {
    let out = runner.run(&spec, PROBE_TIMEOUT).await;
    if !out.success {
        debug!(command = %out.command, "Host fact unavailable");
        return None;
    }
    out.stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingTool {
    pub name: String,
    pub suggestion: String,
}

/// The binary that stands in for `tool` on `os`.
pub fn tool_name(tool: &str, os: OsType) -> &str {
    match (tool, os) {
        ("traceroute", OsType::Windows) => "tracert",
        ("dig", OsType::Windows) => "nslookup",
        _ => tool,
    }
}

pub fn install_suggestion(tool: &str, os: OsType) -> String {
    let hint = match (os, tool) {
        (OsType::Linux, "ping") => "Usually pre-installed",
        (OsType::Linux, "traceroute") => "sudo apt-get install traceroute (or yum install traceroute)",
        (OsType::Linux, "dig") => "sudo apt-get install dnsutils (or yum install bind-utils)",
        (OsType::Linux, "nmap") => "sudo apt-get install nmap (or yum install nmap)",
        (OsType::MacOs, "ping" | "traceroute" | "dig") => "Pre-installed",
        (OsType::MacOs, "nmap") => "brew install nmap",
        (OsType::Windows, "ping" | "traceroute" | "tracert") => "Pre-installed",
        (OsType::Windows, "dig" | "nslookup") => "Pre-installed (nslookup is used for DNS on Windows)",
        (OsType::Windows, "nmap") => "Download the installer from https://nmap.org/download.html",
        _ => return format!("Please install {} manually", tool),
    };
    hint.to_string()
}

/// Tools from `tools` that are not on `PATH`, with install hints.
pub fn check_required_tools(tools: &[&str], os: OsType) -> Vec<MissingTool> {
    check_tools_with(tools, os, |bin| which::which(bin).is_ok())
}

fn check_tools_with<F>(tools: &[&str], os: OsType, available: F) -> Vec<MissingTool>
where
    F: Fn(&str) -> bool,
{
    tools
        .iter()
        .filter(|tool| !available(tool_name(tool, os)))
        .map(|tool| MissingTool {
            name: tool.to_string(),
            suggestion: install_suggestion(tool, os),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::probes::testing::FakeRunner;

    #[test]
    fn test_windows_tool_names() {
        assert_eq!(tool_name("traceroute", OsType::Windows), "tracert");
        assert_eq!(tool_name("dig", OsType::Windows), "nslookup");
        assert_eq!(tool_name("dig", OsType::Linux), "dig");
        assert_eq!(tool_name("nmap", OsType::Windows), "nmap");
    }

    #[test]
    fn test_missing_tools_report_requested_name() {
        let missing = check_tools_with(&REQUIRED_TOOLS, OsType::Windows, |bin| bin == "ping");
        let names: Vec<&str> = missing.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["traceroute", "dig"]);
        assert!(missing[1].suggestion.contains("nslookup"));

        assert!(check_tools_with(&REQUIRED_TOOLS, OsType::Linux, |_| true).is_empty());
        assert_eq!(install_suggestion("mtr", OsType::Linux), "Please install mtr manually");
    }

    #[tokio::test]
    async fn test_detect_system_uses_uname() {
        let runner = Arc::new(FakeRunner::ok("Linux 6.1.0-rpi7\n"));
        let info = detect_system(runner.as_ref(), OsType::Linux).await;
        assert_eq!(info.os_type, OsType::Linux);
        assert!(info.platform.starts_with("Linux-6.1.0-rpi7-"));
        assert!(!info.hostname.is_empty());
    }

    #[tokio::test]
    async fn test_detect_system_tolerates_failures() {
        let runner = FakeRunner::with(1, "", "not found");
        let info = detect_system(&runner, OsType::Windows).await;
        assert!(info.platform.starts_with("Windows-"));
    }
}
