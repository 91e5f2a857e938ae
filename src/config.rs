//! TOML configuration for netscope.
//!
//! Every section is optional; missing keys fall back to compiled-in
//! defaults. Command-line flags are applied on top by `main`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::parallel::{positive_secs, ConfigError, ParallelTestConfig};
use crate::probes::ProbeEnv;

pub const CONFIG_ENV: &str = "NETSCOPE_CONFIG";
pub const CONFIG_FILE_NAME: &str = ".netscope.toml";

/// Headroom kept between the subprocess timeout and the executor deadline.
const DEADLINE_MARGIN_SECS: f64 = 5.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub parallel: ParallelTestConfig,
    pub monitor: MonitorConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Resolve the configuration, trying in order:
    /// 1. `explicit` (the `--config` flag). A broken file here is an error.
    /// 2. The path in `NETSCOPE_CONFIG`.
    /// 3. `./.netscope.toml`, then `~/.netscope.toml`.
    /// 4. Defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let mut candidates = Vec::new();
        if let Some(env_path) = std::env::var_os(CONFIG_ENV) {
            candidates.push(PathBuf::from(env_path));
        }
        candidates.push(PathBuf::from(CONFIG_FILE_NAME));
        if let Some(home) = home_dir() {
            candidates.push(home.join(CONFIG_FILE_NAME));
        }

        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(path = %path.display(), error = %format!("{:#}", e), "Config file skipped");
                }
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parallel.validate()?;
        if positive_secs(self.general.timeout).is_none() {
            return Err(ConfigError::InvalidTimeout(self.general.timeout));
        }
        if positive_secs(self.monitor.interval_secs).is_none() {
            return Err(ConfigError::InvalidInterval);
        }
        Ok(())
    }

    /// Subprocess deadline for command-backed probes.
    ///
    /// Capped below `parallel.timeout` so a hung tool is killed by the
    /// command layer and reported as a failure before the executor gives up
    /// on the task. Only meaningful on a validated config.
    pub fn command_timeout(&self) -> Duration {
        let deadline = self.parallel.timeout;
        let ceiling = (deadline - DEADLINE_MARGIN_SECS).max(deadline / 2.0);
        positive_secs(self.general.timeout.min(ceiling)).unwrap_or(ProbeEnv::DEFAULT_COMMAND_TIMEOUT)
    }

    pub fn monitor_interval(&self) -> Duration {
        positive_secs(self.monitor.interval_secs).unwrap_or(Duration::from_secs(60))
    }

    /// `storage.db_path`, or `netscope.db` inside the output directory.
    pub fn db_path(&self) -> PathBuf {
        self.storage
            .db_path
            .clone()
            .unwrap_or_else(|| self.general.output_dir.join("netscope.db"))
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Where the results database lives unless `storage.db_path` is set.
    pub output_dir: PathBuf,
    pub verbose: bool,
    /// Default per-probe deadline in seconds for single-shot commands.
    pub timeout: f64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./netscope_results"),
            verbose: false,
            timeout: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: f64,
    pub history_limit: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60.0,
            history_limit: crate::parallel::monitor::DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Persist every run to SQLite.
    pub enabled: bool,
    pub db_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: None,
        }
    }
}
