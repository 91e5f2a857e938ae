//! Plain-text rendering of results for the terminal.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::parallel::RunSummary;
use crate::probes::TestResult;
use crate::storage::RunRecord;
use crate::system::{MissingTool, SystemInfo};

const SUMMARY_WIDTH: usize = 60;

fn clip(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// One row per result; errors are shown on an indented line below.
pub fn results_table(results: &[TestResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<16} | {:<22} | {:<7} | {:>8} | Summary",
        "Test", "Target", "Status", "Duration"
    );
    let _ = writeln!(out, "{:-<16}-|-{:-<22}-|-{:-<7}-|-{:->8}-|-{:-<40}", "", "", "", "", "");
    for r in results {
        let _ = writeln!(
            out,
            "{:<16} | {:<22} | {:<7} | {:>7.2}s | {}",
            clip(&r.test_name, 16),
            clip(&r.target, 22),
            r.status.to_string(),
            r.duration,
            clip(&r.summary, SUMMARY_WIDTH)
        );
        if let Some(err) = r.error.as_deref().filter(|e| !e.is_empty()) {
            let _ = writeln!(out, "{:<16} | {:<22} |   -> {}", "", "", clip(err, SUMMARY_WIDTH));
        }
    }
    out
}

pub fn summary_line(summary: &RunSummary) -> String {
    format!(
        "{} test(s): {} success, {} warning, {} failure, {} error ({:.1}% success)",
        summary.total, summary.success, summary.warning, summary.failure, summary.error, summary.success_rate
    )
}

/// Batch output: a section per task name.
pub fn grouped_table(grouped: &BTreeMap<String, Vec<TestResult>>) -> String {
    let mut out = String::new();
    for (name, results) in grouped {
        let _ = writeln!(out, "\n=== {} ===", name);
        out.push_str(&results_table(results));
    }
    out
}

pub fn runs_table(runs: &[RunRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<25} | {:<24} | {:>7} | Run", "Started", "Command", "Results");
    let _ = writeln!(out, "{:-<25}-|-{:-<24}-|-{:->7}-|-{:-<36}", "", "", "", "");
    for run in runs {
        let _ = writeln!(
            out,
            "{:<25} | {:<24} | {:>7} | {}",
            run.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            clip(&run.command, 24),
            run.result_count,
            run.id
        );
    }
    out
}

pub fn system_report(info: &SystemInfo, missing: &[MissingTool]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<18} : {}", "OS", info.os_type);
    let _ = writeln!(out, "{:<18} : {}", "Platform", info.platform);
    let _ = writeln!(out, "{:<18} : {}", "Hostname", info.hostname);
    let _ = writeln!(out, "{:<18} : {}", "netscope", info.netscope_version);
    if missing.is_empty() {
        let _ = writeln!(out, "\nAll required tools available");
    } else {
        let _ = writeln!(out, "\nMissing tools:");
        for tool in missing {
            let _ = writeln!(out, "  - {}: {}", tool.name, tool.suggestion);
        }
    }
    out
}
