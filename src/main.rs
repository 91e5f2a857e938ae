use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use netscope::config::AppConfig;
use netscope::exec::SystemRunner;
use netscope::parallel::{positive_secs, BatchRunner, BatchTask, ContinuousMonitor, ParallelExecutor, RunSummary};
use netscope::platform::OsType;
use netscope::probes::arp::ArpProbe;
use netscope::probes::dns::DnsProbe;
use netscope::probes::nmap::NmapProbe;
use netscope::probes::ping::PingProbe;
use netscope::probes::ports::{parse_port_list, PortPreset, PortScanProbe};
use netscope::probes::sweep::PingSweepProbe;
use netscope::probes::trace::TracerouteProbe;
use netscope::probes::{Probe, ProbeEnv, ProbeKind, TestResult};
use netscope::system::targets::{validate_target, TargetResolver};
use netscope::{report, storage, system};

#[derive(Parser)]
#[command(
    name = "netscope",
    about = "Network diagnostics: ping, traceroute, DNS, port scans, nmap, ARP and ping sweeps",
    version,
    long_about = None
)]
struct Cli {
    /// JSON output for machine parsing
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: $NETSCOPE_CONFIG, ./.netscope.toml, ~/.netscope.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Do not save results to the database
    #[arg(long, global = true)]
    no_store: bool,

    /// Probes in flight at once
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Per-probe deadline in seconds
    #[arg(long, global = true, value_parser = parse_positive)]
    timeout: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// ICMP echo test
    Ping {
        /// Host, IP or shortcut (localhost, gateway, dns)
        target: String,

        /// Echo requests to send
        #[arg(long, default_value_t = 4)]
        count: u32,
    },

    /// Trace the route to a host
    Traceroute {
        target: String,

        #[arg(long, default_value_t = 15)]
        max_hops: u32,
    },

    /// Resolve a hostname
    Dns { target: String },

    /// TCP connect scan
    Ports {
        target: String,

        /// Port list, e.g. "22,80,8000-8010" (overrides --preset)
        #[arg(long)]
        ports: Option<String>,

        /// top20 or top100
        #[arg(long, default_value = "top20")]
        preset: PortPreset,

        /// Seconds to wait for each connection
        #[arg(long, default_value_t = 2.0, value_parser = parse_positive)]
        port_timeout: f64,
    },

    /// Port and service scan through nmap
    Nmap {
        target: String,

        /// nmap -p value
        #[arg(long)]
        ports: Option<String>,

        /// Scan flags replacing the default "-sT -sV"
        #[arg(long = "args", num_args = 1.., allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// List devices in the local ARP table
    Arp,

    /// Ping every host in a CIDR range (at most a /24)
    Sweep { cidr: String },

    /// Ping, traceroute and DNS against one target
    QuickCheck { target: String },

    /// Run one test against many targets concurrently
    Parallel {
        /// ping, traceroute, dns, ports, nmap, arp or sweep
        #[arg(long = "test")]
        kind: ProbeKind,

        /// Dispatches per second
        #[arg(long, value_parser = parse_positive)]
        rate_limit: Option<f64>,

        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Repeat a test on an interval until stopped
    Monitor {
        #[arg(long = "test")]
        kind: ProbeKind,

        /// Seconds between cycles
        #[arg(long, value_parser = parse_positive)]
        interval: Option<f64>,

        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long, value_parser = parse_positive)]
        duration: Option<f64>,

        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Show system information and missing tools
    System,

    /// Show recently stored results
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// List stored runs instead of individual results
        #[arg(long)]
        runs: bool,
    },
}

fn parse_positive(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(v) if positive_secs(v).is_some() => Ok(v),
        Ok(_) => Err("must be a positive, finite number".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(summary: &RunSummary) -> ExitCode {
    if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

struct App {
    config: AppConfig,
    env: ProbeEnv,
    json: bool,
    explicit_timeout: bool,
    pool: Option<storage::Pool>,
    resolver: TargetResolver,
}

impl App {
    /// Executor for `kind`, with the deadline raised for slow probes unless
    /// the user set one.
    fn executor(&self, kind: Option<ProbeKind>) -> Result<ParallelExecutor> {
        let mut cfg = self.config.parallel.clone();
        if !self.explicit_timeout {
            if let Some(min) = kind.and_then(ProbeKind::min_deadline) {
                cfg.timeout = cfg.timeout.max(min.as_secs_f64());
            }
        }
        Ok(ParallelExecutor::new(cfg)?)
    }

    async fn resolve(&self, target: &str) -> Result<String> {
        Ok(self.resolver.resolve(target).await?)
    }

    fn store(&self, command: &str, results: &[TestResult]) {
        if let Some(pool) = &self.pool {
            if let Err(e) = storage::save_run(pool, command, results) {
                warn!(error = %format!("{:#}", e), "Could not save results");
            }
        }
    }

    fn emit(&self, results: &[TestResult]) -> Result<ExitCode> {
        let summary = RunSummary::from_results(results);
        if self.json {
            let doc = json!({ "results": results, "summary": summary });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        } else {
            print!("{}", report::results_table(results));
            println!("\n{}", report::summary_line(&summary));
        }
        Ok(exit_code(&summary))
    }

    async fn run_single(&self, command: &str, kind: ProbeKind, probe: Arc<dyn Probe>, target: String) -> Result<ExitCode> {
        let results = self.executor(Some(kind))?.execute_parallel(probe, &[target]).await;
        self.store(command, &results);
        self.emit(&results)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = AppConfig::resolve(cli.config.as_deref())?;
    if let Some(workers) = cli.workers {
        config.parallel.max_workers = workers;
    }
    if let Some(timeout) = cli.timeout {
        config.parallel.timeout = timeout;
    }
    if cli.no_store {
        config.storage.enabled = false;
    }
    config.validate().context("invalid settings")?;

    init_tracing(cli.verbose || config.general.verbose);

    let needs_pool = match cli.command {
        Commands::System => false,
        Commands::History { .. } => true,
        _ => config.storage.enabled,
    };
    let pool = if needs_pool {
        let path = config.db_path();
        match storage::open_pool(&path) {
            Ok(pool) => Some(pool),
            Err(e) if !matches!(cli.command, Commands::History { .. }) => {
                warn!(path = %path.display(), error = %format!("{:#}", e), "Storage disabled");
                None
            }
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    let app = App {
        env: ProbeEnv::system().with_command_timeout(config.command_timeout()),
        json: cli.json,
        explicit_timeout: cli.timeout.is_some(),
        pool,
        resolver: TargetResolver::system(),
        config,
    };

    match cli.command {
        Commands::Ping { target, count } => {
            let target = app.resolve(&target).await?;
            let probe = Arc::new(PingProbe::new(app.env.clone()).with_count(count));
            app.run_single("ping", ProbeKind::Ping, probe, target).await
        }
        Commands::Traceroute { target, max_hops } => {
            let target = app.resolve(&target).await?;
            let probe = Arc::new(TracerouteProbe::new(app.env.clone()).with_max_hops(max_hops));
            app.run_single("traceroute", ProbeKind::Traceroute, probe, target).await
        }
        Commands::Dns { target } => {
            let target = app.resolve(&target).await?;
            let probe = Arc::new(DnsProbe::new(app.env.clone()));
            app.run_single("dns", ProbeKind::Dns, probe, target).await
        }
        Commands::Ports {
            target,
            ports,
            preset,
            port_timeout,
        } => {
            let target = app.resolve(&target).await?;
            let list = match ports {
                Some(list) => parse_port_list(&list)?,
                None => preset.ports().to_vec(),
            };
            let probe = Arc::new(PortScanProbe::new(list).with_timeout(Duration::from_secs_f64(port_timeout)));
            app.run_single("ports", ProbeKind::Ports, probe, target).await
        }
        Commands::Nmap { target, ports, args } => {
            let target = app.resolve(&target).await?;
            let probe = Arc::new(NmapProbe::new(app.env.clone()).with_ports(ports).with_args(args));
            app.run_single("nmap", ProbeKind::Nmap, probe, target).await
        }
        Commands::Arp => {
            let probe = Arc::new(ArpProbe::new(app.env.clone()));
            app.run_single("arp", ProbeKind::Arp, probe, "local".to_string()).await
        }
        Commands::Sweep { cidr } => {
            let cidr = validate_target(&cidr)?.to_string();
            let probe = Arc::new(PingSweepProbe::new(app.env.clone()));
            app.run_single("sweep", ProbeKind::Sweep, probe, cidr).await
        }
        Commands::QuickCheck { target } => {
            let target = app.resolve(&target).await?;
            info!(%target, "Running quick check");
            let tasks = [ProbeKind::Ping, ProbeKind::Traceroute, ProbeKind::Dns]
                .into_iter()
                .map(|kind| BatchTask::new(kind.to_string(), kind.build(&app.env), target.clone()))
                .collect();
            let runner = BatchRunner::from_executor(app.executor(Some(ProbeKind::Traceroute))?);
            let grouped = runner.run_batch(tasks).await;

            let all: Vec<TestResult> = grouped.values().flatten().cloned().collect();
            app.store("quick-check", &all);
            let summary = RunSummary::from_results(&all);
            if app.json {
                let doc = json!({ "results": grouped, "summary": summary });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                print!("{}", report::grouped_table(&grouped));
                println!("\n{}", report::summary_line(&summary));
            }
            Ok(exit_code(&summary))
        }
        Commands::Parallel {
            kind,
            rate_limit,
            targets,
        } => {
            let targets = app.resolver.resolve_all(&targets).await?;
            let mut executor = app.executor(Some(kind))?;
            if rate_limit.is_some() {
                let mut cfg = executor.config().clone();
                cfg.rate_limit = rate_limit;
                executor = ParallelExecutor::new(cfg)?;
            }

            let show_progress = !app.json;
            let results = executor
                .execute_parallel_with_progress(kind.build(&app.env), &targets, |done, total| {
                    if show_progress {
                        eprint!("\r[{}/{}] completed", done, total);
                        if done == total {
                            eprintln!();
                        }
                    }
                })
                .await;
            app.store(&format!("parallel {}", kind), &results);
            app.emit(&results)
        }
        Commands::Monitor {
            kind,
            interval,
            duration,
            targets,
        } => {
            let targets = app.resolver.resolve_all(&targets).await?;
            let interval = interval
                .map(Duration::from_secs_f64)
                .unwrap_or_else(|| app.config.monitor_interval());
            let executor = app.executor(Some(kind))?;
            let monitor = ContinuousMonitor::new(kind.build(&app.env), targets, interval, executor.config().clone())?
                .with_history_limit(app.config.monitor.history_limit);

            let handle = monitor.handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, stopping monitor");
                    handle.stop();
                }
            });

            let command = format!("monitor {}", kind);
            let mut cycle = 0u64;
            let mut last = RunSummary::default();
            let state = monitor
                .start_with_callback(duration.map(Duration::from_secs_f64), |results| {
                    cycle += 1;
                    last = RunSummary::from_results(results);
                    app.store(&command, results);
                    if app.json {
                        let line = json!({ "cycle": cycle, "results": results, "summary": last });
                        println!("{}", line);
                    } else {
                        println!("\n--- Cycle {} ({}) ---", cycle, chrono::Local::now().format("%H:%M:%S"));
                        print!("{}", report::results_table(results));
                        println!("{}", report::summary_line(&last));
                    }
                })
                .await;

            info!(state = ?state, cycles = cycle, "Monitor ended");
            Ok(exit_code(&last))
        }
        Commands::System => {
            let os = OsType::current();
            let info = system::detect_system(&SystemRunner, os).await;
            let mut missing = system::check_required_tools(&system::REQUIRED_TOOLS, os);
            // Optional, only needed by the nmap test.
            missing.extend(system::check_required_tools(&["nmap"], os));
            if app.json {
                let doc = json!({ "system": info, "missing_tools": missing });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                print!("{}", report::system_report(&info, &missing));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::History { limit, runs } => {
            let Some(pool) = &app.pool else {
                return Ok(ExitCode::SUCCESS);
            };
            if runs {
                let runs = storage::recent_runs(pool, limit)?;
                if app.json {
                    println!("{}", serde_json::to_string_pretty(&runs)?);
                } else if runs.is_empty() {
                    println!("No stored runs.");
                } else {
                    print!("{}", report::runs_table(&runs));
                }
                return Ok(ExitCode::SUCCESS);
            }
            let results = storage::recent_results(pool, limit)?;
            if app.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No stored results.");
            } else {
                print!("{}", report::results_table(&results));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
