//! CLI entry point for autorestart.
//!
//! This binary watches the working directories of supervised targets and
//! kills (and thereby restarts) a target when one of its files changes.
//! A target opts in by carrying `.autorestart_includes` and/or
//! `.autorestart_excludes` in its working directory.
//!
//! # Usage
//!
//! ```bash
//! autorestart [OPTIONS] <COMMAND>
//!
//! # Monitor every circus watcher until Ctrl-C
//! autorestart run --endpoint tcp://127.0.0.1:5555
//!
//! # Dry run: what would be watched, and which paths count
//! autorestart check --dir /srv/web app.py logs/today.log
//!
//! # List targets and whether they opted in
//! autorestart targets --format json
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::fmt::Write as _;
use std::io::Write;

use ar_core::{Config, Target, TargetName, WatchConfig};
use ar_registry::WatcherRegistry;
use ar_supervisor::{CircusctlSupervisor, Supervisor};
use ar_watcher::{Decision, DirectoryWatcher, MemoryBackend, PatternSet, RuleMatcher};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Restart supervised processes when their source files change.
#[derive(Parser)]
#[command(name = "autorestart", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file.
    #[arg(short, long, global = true, env = "AUTORESTART_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Control program used to talk to the supervisor.
    #[arg(long, global = true, env = "AUTORESTART_CIRCUSCTL")]
    circusctl: Option<String>,

    /// Supervisor endpoint (e.g. `tcp://127.0.0.1:5555`).
    #[arg(long, global = true, env = "AUTORESTART_ENDPOINT")]
    endpoint: Option<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Monitor all targets and restart them on changes.
    Run(RunArgs),

    /// Show what would be watched in a directory and how paths are classified.
    Check {
        /// Working directory to inspect.
        #[arg(short, long)]
        dir: Utf8PathBuf,

        /// Paths to classify, relative to the working directory or absolute.
        paths: Vec<Utf8PathBuf>,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List supervisor targets and whether they are monitored.
    Targets {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// Overrides for the monitoring loop.
#[derive(Args)]
struct RunArgs {
    /// Change-detection interval in milliseconds.
    #[arg(long, env = "AUTORESTART_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Target reconciliation interval in milliseconds.
    #[arg(long, env = "AUTORESTART_RECONCILE_INTERVAL_MS")]
    reconcile_interval_ms: Option<u64>,

    /// Signal sent to restart a target.
    #[arg(long, env = "AUTORESTART_SIGNAL")]
    signal: Option<i32>,

    /// Also watch directories created after monitoring started.
    #[arg(long)]
    watch_new_directories: bool,
}

/// Output format for reports.
#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human readable text.
    Text,
    /// JSON.
    Json,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects `RUST_LOG` if set. Otherwise uses `debug` with `--verbose` and
/// `info` by default; `notify` internals are held at `warn`.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},notify=warn"))
    });

    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Builds the [`Config`] from the optional file plus CLI overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or the result is invalid.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(program) = &cli.circusctl {
        config.supervisor.program.clone_from(program);
    }
    if let Some(endpoint) = &cli.endpoint {
        config.supervisor.endpoint = Some(endpoint.clone());
    }

    if let Commands::Run(args) = &cli.command {
        if let Some(ms) = args.poll_interval_ms {
            config.schedule.poll_interval_ms = ms;
        }
        if let Some(ms) = args.reconcile_interval_ms {
            config.schedule.reconcile_interval_ms = ms;
        }
        if let Some(signal) = args.signal {
            config.schedule.kill_signal = signal;
        }
        if args.watch_new_directories {
            config.watch.watch_new_directories = true;
        }
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Runs the monitoring loop until Ctrl-C or SIGTERM.
async fn run_monitor(config: Config) -> color_eyre::Result<()> {
    info!(
        program = %config.supervisor.program,
        endpoint = config.supervisor.endpoint.as_deref().unwrap_or("default"),
        "Starting autorestart"
    );

    let supervisor = CircusctlSupervisor::from_config(&config.supervisor);
    let registry = WatcherRegistry::with_notify(supervisor, &config);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    registry.run(shutdown).await;
    Ok(())
}

/// Resolves when the process is asked to stop.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                warn!(%error, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Prints the dry-run report for `dir`.
fn run_check(
    config: &Config,
    dir: &Utf8Path,
    paths: &[Utf8PathBuf],
    format: OutputFormat,
) -> color_eyre::Result<()> {
    if !dir.is_dir() {
        return Err(color_eyre::eyre::eyre!("Not a directory: {dir}"));
    }

    let report = CheckReport::inspect(dir, &config.watch, paths);
    let content = match format {
        OutputFormat::Text => render_check(&report),
        OutputFormat::Json => to_json(&report)?,
    };

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write!(handle, "{content}")?;
    Ok(())
}

/// Prints every supervisor target with its state.
async fn run_targets(config: &Config, format: OutputFormat) -> color_eyre::Result<()> {
    let supervisor = CircusctlSupervisor::from_config(&config.supervisor);
    let names = supervisor.list().await?;

    let mut rows = Vec::with_capacity(names.len());
    for name in names {
        rows.push(TargetRow::fetch(&supervisor, &config.watch, name).await);
    }

    let content = match format {
        OutputFormat::Text => render_targets(&rows),
        OutputFormat::Json => to_json(&rows)?,
    };

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write!(handle, "{content}")?;
    Ok(())
}

// =============================================================================
// REPORTS
// =============================================================================

/// Dry-run view of one working directory.
#[derive(Debug, Serialize)]
struct CheckReport {
    working_dir: Utf8PathBuf,
    monitored: bool,
    rule_files: Vec<RuleFileReport>,
    watched: Vec<Utf8PathBuf>,
    decisions: Vec<PathDecision>,
}

#[derive(Debug, Serialize)]
struct RuleFileReport {
    name: String,
    state: RuleFileState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum RuleFileState {
    Missing,
    Unreadable,
    Loaded { rules: usize },
}

#[derive(Debug, Serialize)]
struct PathDecision {
    path: Utf8PathBuf,
    is_dir: bool,
    decision: Decision,
}

impl CheckReport {
    /// Starts a watcher on an in-memory backend and records what it sees.
    fn inspect(dir: &Utf8Path, watch: &WatchConfig, paths: &[Utf8PathBuf]) -> Self {
        let monitored = PatternSet::is_opted_in(dir, watch);
        let watcher = DirectoryWatcher::start(
            Target::new("check", dir),
            watch,
            Box::new(MemoryBackend::new()),
        );
        let root = watcher.working_dir();

        let rule_files = vec![
            RuleFileReport::new(&watch.includes_file, &watch.includes_path(root), watcher.rules().include()),
            RuleFileReport::new(&watch.excludes_file, &watch.excludes_path(root), watcher.rules().exclude()),
        ];

        let watched = watcher
            .watched_directories()
            .into_iter()
            .map(|watched| relative_to(watched, root))
            .collect();

        let decisions = paths
            .iter()
            .map(|path| {
                let absolute = if path.is_absolute() { path.clone() } else { root.join(path) };
                let is_dir = absolute.is_dir();
                PathDecision {
                    path: path.clone(),
                    is_dir,
                    decision: watcher.classify(&absolute, is_dir),
                }
            })
            .collect();

        Self {
            working_dir: root.to_owned(),
            monitored,
            rule_files,
            watched,
            decisions,
        }
    }
}

impl RuleFileReport {
    fn new(name: &str, path: &Utf8Path, matcher: &RuleMatcher) -> Self {
        let state = if !path.exists() {
            RuleFileState::Missing
        } else if matcher.is_constant() {
            RuleFileState::Unreadable
        } else {
            RuleFileState::Loaded {
                rules: matcher.rule_count(),
            }
        };
        Self {
            name: name.to_owned(),
            state,
        }
    }
}

fn relative_to(path: &Utf8Path, root: &Utf8Path) -> Utf8PathBuf {
    match path.strip_prefix(root) {
        Ok(relative) if relative.as_str().is_empty() => Utf8PathBuf::from("."),
        Ok(relative) => relative.to_owned(),
        Err(_) => path.to_owned(),
    }
}

/// One line of the `targets` listing.
#[derive(Debug, Serialize)]
struct TargetRow {
    name: TargetName,
    status: String,
    working_dir: Option<Utf8PathBuf>,
    opted_in: bool,
}

impl TargetRow {
    async fn fetch<S: Supervisor>(supervisor: &S, watch: &WatchConfig, name: TargetName) -> Self {
        let status = match supervisor.status(&name).await {
            Ok(status) => status.label().to_owned(),
            Err(error) => {
                warn!(target_name = %name, %error, "Cannot read target status");
                "unknown".to_owned()
            }
        };
        let working_dir = match supervisor.options(&name).await {
            Ok(options) => options.working_dir,
            Err(error) => {
                warn!(target_name = %name, %error, "Cannot read target options");
                None
            }
        };
        let opted_in = working_dir
            .as_deref()
            .is_some_and(|dir| PatternSet::is_opted_in(dir, watch));

        Self {
            name,
            status,
            working_dir,
            opted_in,
        }
    }
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

fn render_check(report: &CheckReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Working directory: {}", report.working_dir);
    let _ = writeln!(
        out,
        "Monitored: {}",
        if report.monitored { "yes" } else { "no (no rule files)" }
    );

    let _ = writeln!(out, "Rule files:");
    for rule in &report.rule_files {
        let state = match rule.state {
            RuleFileState::Missing => "missing".to_owned(),
            RuleFileState::Unreadable => "unreadable".to_owned(),
            RuleFileState::Loaded { rules: 1 } => "1 rule".to_owned(),
            RuleFileState::Loaded { rules } => format!("{rules} rules"),
        };
        let _ = writeln!(out, "  {:<24}{state}", rule.name);
    }

    let _ = writeln!(out, "Watched directories ({}):", report.watched.len());
    for dir in &report.watched {
        let _ = writeln!(out, "  {dir}");
    }

    if !report.decisions.is_empty() {
        let _ = writeln!(out, "Decisions:");
        for decision in &report.decisions {
            let suffix = if decision.is_dir { "/" } else { "" };
            let _ = writeln!(out, "  {:<14}{}{suffix}", decision.decision.label(), decision.path);
        }
    }

    out
}

fn render_targets(rows: &[TargetRow]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{:<20} {:<10} {:<10} WORKING DIR", "NAME", "STATUS", "MONITORED");
    for row in rows {
        let _ = writeln!(
            out,
            "{:<20} {:<10} {:<10} {}",
            row.name.as_str(),
            row.status,
            if row.opted_in { "yes" } else { "no" },
            row.working_dir.as_deref().map_or("-", Utf8Path::as_str)
        );
    }

    out
}

fn to_json<T: Serialize>(value: &T) -> color_eyre::Result<String> {
    let mut json = serde_json::to_string_pretty(value)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to serialize JSON: {}", e))?;
    json.push('\n');
    Ok(json)
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Load configuration and apply overrides
    let config = build_config(&cli)?;

    // 5. Route to appropriate command
    match &cli.command {
        Commands::Run(_) => run_monitor(config).await,
        Commands::Check { dir, paths, format } => run_check(&config, dir, paths, *format),
        Commands::Targets { format } => run_targets(&config, *format).await,
    }
}
