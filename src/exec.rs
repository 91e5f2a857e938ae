//! External command execution with a hard timeout.
//!
//! Every probe that shells out goes through a [`CommandRunner`]. The runner
//! never fails: spawn errors and timeouts come back as a [`CommandResult`]
//! with `success == false`, so probes can classify them like any other
//! tool failure.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info};

/// A program plus its arguments, as produced by a [`crate::platform::Toolchain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Outcome of one external command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub command: String,
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock seconds.
    pub duration: f64,
    pub success: bool,
}

impl CommandResult {
    /// A command that never produced an exit status (spawn failure or timeout).
    pub fn failed(command: impl Into<String>, stderr: impl Into<String>, duration: f64) -> Self {
        Self {
            command: command.into(),
            return_code: -1,
            stdout: String::new(),
            stderr: stderr.into(),
            duration,
            success: false,
        }
    }

    /// stderr when present, otherwise a generic exit-code message.
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("{} exited with code {}", self.command, self.return_code)
        } else {
            stderr.to_string()
        }
    }
}

/// Something that can run a [`CommandSpec`]. Probes hold an
/// `Arc<dyn CommandRunner>` so tests can swap in canned output.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> CommandResult;
}

/// Runs commands on the local system via `tokio::process`.
///
/// The child is spawned with `kill_on_drop`, so when the timeout fires (or
/// the calling task is aborted by the parallel executor) the process is
/// killed rather than left running.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait::async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> CommandResult {
        let start = Instant::now();
        let cmd_str = spec.to_string();

        info!(command = %cmd_str, "Executing command");

        let output = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(timeout, output).await {
            Ok(Ok(out)) => {
                let duration = start.elapsed().as_secs_f64();
                // Killed by a signal on Unix: no code, treat like our own failures.
                let return_code = out.status.code().unwrap_or(-1);
                info!(
                    command = %cmd_str,
                    return_code,
                    duration = format!("{:.2}s", duration),
                    "Command completed"
                );
                CommandResult {
                    command: cmd_str,
                    return_code,
                    stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
                    duration,
                    success: out.status.success(),
                }
            }
            Ok(Err(e)) => {
                error!(command = %cmd_str, error = %e, "Command failed to start");
                CommandResult::failed(cmd_str, e.to_string(), start.elapsed().as_secs_f64())
            }
            Err(_) => {
                error!(command = %cmd_str, timeout_secs = timeout.as_secs_f64(), "Command timed out");
                debug!(command = %cmd_str, "Child killed on drop");
                CommandResult::failed(
                    cmd_str,
                    format!("Command timed out after {} seconds", timeout.as_secs()),
                    start.elapsed().as_secs_f64(),
                )
            }
        }
    }
}
