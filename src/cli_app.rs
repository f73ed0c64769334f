//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use harborwatch_lite::core::cancel::CancelToken;
use harborwatch_lite::core::config::Config;
use harborwatch_lite::core::errors::HwlError;
use harborwatch_lite::daemon::loop_main::{DaemonArgs as DaemonRunArgs, LoadDaemon};
use harborwatch_lite::daemon::signals::SignalHandler;
use harborwatch_lite::load::controller::{
    DEFAULT_COMBINED_SECS, DEFAULT_CPU_ITERATIONS, DEFAULT_DATABASE_OPS, DEFAULT_MEMORY_MB,
    LoadController,
};
use harborwatch_lite::load::result::LoadResult;
use harborwatch_lite::logger::dual::{ActivityLoggerHandle, DualLoggerConfig, spawn_logger};
use harborwatch_lite::logger::sqlite::SqliteStore;
use harborwatch_lite::logger::stats::{StatsEngine, WindowStats, window_label};
use harborwatch_lite::sink::memory::MemorySink;
use harborwatch_lite::sink::{MetricsStore, ResultSink};

/// HarborWatch-Lite: bounded synthetic load and telemetry generator.
#[derive(Debug, Parser)]
#[command(
    name = "hwl",
    author,
    version,
    about = "HarborWatch-Lite - bounded load and telemetry generator",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Run stressors against an in-memory sink; nothing is persisted.
    #[arg(long, global = true)]
    dry_run: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the CPU stressor.
    Cpu(CpuArgs),
    /// Run the memory stressor.
    Memory(MemoryArgs),
    /// Run the database stressor.
    Database(DatabaseArgs),
    /// Run all three stressors concurrently for a bounded duration.
    Combined(CombinedArgs),
    /// Run the telemetry daemon.
    Daemon(DaemonArgs),
    /// Show recent stressor results.
    Results(ResultsArgs),
    /// Show recent telemetry rows.
    Metrics(MetricsArgs),
    /// Show aggregated statistics over time windows.
    Stats(StatsArgs),
    /// View and validate configuration.
    Config(ConfigArgs),
    /// Show version and optional build metadata.
    Version(VersionArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Serialize)]
struct CpuArgs {
    /// Loop iterations (clamped to [0, 7000000]).
    #[arg(value_name = "ITERATIONS", allow_negative_numbers = true, default_value_t = DEFAULT_CPU_ITERATIONS)]
    iterations: i64,
}

#[derive(Debug, Clone, Args, Serialize)]
struct MemoryArgs {
    /// Megabytes to allocate (clamped to [1, 1000]).
    #[arg(value_name = "SIZE_MB", allow_negative_numbers = true, default_value_t = DEFAULT_MEMORY_MB)]
    size_mb: i64,
}

#[derive(Debug, Clone, Args, Serialize)]
struct DatabaseArgs {
    /// Insert operations (clamped to [1, 10000]).
    #[arg(value_name = "OPS", allow_negative_numbers = true, default_value_t = DEFAULT_DATABASE_OPS)]
    ops: i64,
}

#[derive(Debug, Clone, Args, Serialize)]
struct CombinedArgs {
    /// Dispatch duration in seconds (clamped to [1, 60]).
    #[arg(value_name = "SECONDS", allow_negative_numbers = true, default_value_t = DEFAULT_COMBINED_SECS)]
    duration_secs: i64,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct DaemonArgs {
    /// Stop after this many seconds instead of waiting for a signal.
    #[arg(long, value_name = "SECONDS")]
    run_for: Option<u64>,
}

#[derive(Debug, Clone, Args, Serialize)]
struct ResultsArgs {
    /// Maximum rows to show, newest first.
    #[arg(long, default_value_t = 20, value_name = "N")]
    limit: u32,
}

#[derive(Debug, Clone, Args, Serialize)]
struct MetricsArgs {
    /// Maximum rows to show, newest first.
    #[arg(long, default_value_t = 20, value_name = "N")]
    limit: u32,
    /// Only rows with this metric name.
    #[arg(long, value_name = "NAME")]
    name: Option<String>,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct StatsArgs {
    /// Time window (for example: `15m`, `24h`, `7d`). Omit for all standard windows.
    #[arg(long, value_name = "WINDOW")]
    window: Option<String>,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand, Serialize)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct VersionArgs {
    /// Include additional build metadata fields.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

impl From<HwlError> for CliError {
    fn from(err: HwlError) -> Self {
        match err {
            HwlError::InvalidConfig { .. }
            | HwlError::MissingConfig { .. }
            | HwlError::ConfigParse { .. } => Self::User(err.to_string()),
            HwlError::Cancelled { .. } => Self::Partial(err.to_string()),
            HwlError::Lifecycle { .. } => Self::Internal(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Cpu(args) => run_load(cli, LoadRequest::Cpu(args.iterations)),
        Command::Memory(args) => run_load(cli, LoadRequest::Memory(args.size_mb)),
        Command::Database(args) => run_load(cli, LoadRequest::Database(args.ops)),
        Command::Combined(args) => run_load(cli, LoadRequest::Combined(args.duration_secs)),
        Command::Daemon(args) => run_daemon(cli, args),
        Command::Results(args) => run_results(cli, args),
        Command::Metrics(args) => run_metrics(cli, args),
        Command::Stats(args) => run_stats(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Version(args) => emit_version(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Load commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum LoadRequest {
    Cpu(i64),
    Memory(i64),
    Database(i64),
    Combined(i64),
}

impl LoadRequest {
    const fn command(self) -> &'static str {
        match self {
            Self::Cpu(_) => "cpu",
            Self::Memory(_) => "memory",
            Self::Database(_) => "database",
            Self::Combined(_) => "combined",
        }
    }

    const fn requested(self) -> i64 {
        match self {
            Self::Cpu(n) | Self::Memory(n) | Self::Database(n) | Self::Combined(n) => n,
        }
    }
}

fn run_load(cli: &Cli, request: LoadRequest) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;

    let outcome = if cli.dry_run {
        let sink = Arc::new(MemorySink::new());
        let controller =
            LoadController::new(Arc::clone(&sink), sink, config.combined.clone(), None);
        execute_load(&controller, request)
    } else {
        let store = Arc::new(SqliteStore::open(&config.paths.sqlite_db)?);
        let (logger, logger_join) = spawn_logger(DualLoggerConfig::from_paths(&config.paths))?;
        let controller = LoadController::new(
            Arc::clone(&store),
            store,
            config.combined.clone(),
            Some(logger.clone()),
        );
        let outcome = execute_load(&controller, request);
        drop(controller);
        stop_logger(&logger, logger_join);
        outcome
    };

    let result = outcome?;
    emit_load_result(cli, request, &result, &config)
}

fn execute_load<M, R>(
    controller: &LoadController<M, R>,
    request: LoadRequest,
) -> harborwatch_lite::core::errors::Result<LoadResult>
where
    M: MetricsStore + ?Sized + 'static,
    R: ResultSink + ?Sized,
{
    match request {
        LoadRequest::Cpu(n) => controller.cpu(n),
        LoadRequest::Memory(n) => controller.memory(n),
        LoadRequest::Database(n) => controller.database(n),
        LoadRequest::Combined(n) => {
            // SIGINT/SIGTERM cancel dispatch; queued work still drains.
            let cancel: CancelToken = SignalHandler::new().shutdown_token();
            controller.combined(n, &cancel)
        }
    }
}

fn stop_logger(logger: &ActivityLoggerHandle, join: thread::JoinHandle<()>) {
    logger.shutdown();
    let _ = join.join();
}

fn emit_load_result(
    cli: &Cli,
    request: LoadRequest,
    result: &LoadResult,
    config: &Config,
) -> Result<(), CliError> {
    let record = result.to_record();
    match output_mode(cli) {
        OutputMode::Human => {
            if cli.quiet {
                return Ok(());
            }
            println!(
                "{}  {}",
                record.computation_type.bold(),
                record.result.green()
            );
            println!(
                "  magnitude: {} (requested {})",
                result.magnitude,
                request.requested()
            );
            println!("  duration:  {} ms", record.duration_ms);
            if cli.dry_run {
                println!("  {}", "dry run: nothing persisted".yellow());
            } else if cli.verbose {
                println!("  stored in: {}", config.paths.sqlite_db.display());
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": request.command(),
                "requested": request.requested(),
                "dry_run": cli.dry_run,
                "computation_type": record.computation_type,
                "result": record.result,
                "load": serde_json::to_value(result)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

fn run_daemon(cli: &Cli, args: &DaemonArgs) -> Result<(), CliError> {
    if cli.dry_run {
        return Err(CliError::User(
            "--dry-run is not supported for the daemon".to_string(),
        ));
    }
    let config = Config::load(cli.config.as_deref())?;
    let run_args = DaemonRunArgs {
        config_path: cli.config.clone(),
        run_for: args.run_for.map(Duration::from_secs),
    };

    let mut daemon = LoadDaemon::init(config, run_args)?;
    let summary = daemon.run()?;

    match output_mode(cli) {
        OutputMode::Human => {
            if !cli.quiet {
                println!(
                    "daemon stopped after {}s: {} tick(s), {} skipped, {} reload(s), {} row(s) pruned",
                    summary.uptime.as_secs(),
                    summary.ticks,
                    summary.ticks_skipped,
                    summary.reloads,
                    summary.pruned_rows
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "daemon",
                "uptime_secs": summary.uptime.as_secs(),
                "ticks": summary.ticks,
                "ticks_skipped": summary.ticks_skipped,
                "reloads": summary.reloads,
                "pruned_rows": summary.pruned_rows,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Query commands
// ---------------------------------------------------------------------------

/// Open the configured database, or report its absence and return `None`.
fn open_existing_store(cli: &Cli, command: &str) -> Result<Option<SqliteStore>, CliError> {
    let config = Config::load(cli.config.as_deref())?;

    if !config.paths.sqlite_db.exists() {
        match output_mode(cli) {
            OutputMode::Human => {
                println!(
                    "No database found at {}.",
                    config.paths.sqlite_db.display()
                );
                println!("  Run a stressor or the daemon to start collecting data.");
            }
            OutputMode::Json => {
                let payload = json!({
                    "command": command,
                    "error": "no_database",
                    "db_path": config.paths.sqlite_db.to_string_lossy(),
                });
                write_json_line(&payload)?;
            }
        }
        return Ok(None);
    }

    let db = SqliteStore::open(&config.paths.sqlite_db)
        .map_err(|e| CliError::Runtime(format!("open database: {e}")))?;
    Ok(Some(db))
}

fn run_results(cli: &Cli, args: &ResultsArgs) -> Result<(), CliError> {
    let Some(db) = open_existing_store(cli, "results")? else {
        return Ok(());
    };
    let rows = db.recent_results(args.limit)?;

    match output_mode(cli) {
        OutputMode::Human => {
            if rows.is_empty() {
                println!("No results recorded yet.");
                return Ok(());
            }
            println!(
                "  {:<24}  {:<18}  {:>10}  {:>9}  {}",
                "Timestamp", "Type", "Input", "Duration", "Result"
            );
            println!("  {}", "-".repeat(86));
            for row in &rows {
                println!(
                    "  {:<24}  {:<18}  {:>10}  {:>7}ms  {}",
                    row.timestamp, row.computation_type, row.input_size, row.duration_ms, row.result
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "results",
                "count": rows.len(),
                "results": rows,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_metrics(cli: &Cli, args: &MetricsArgs) -> Result<(), CliError> {
    let Some(db) = open_existing_store(cli, "metrics")? else {
        return Ok(());
    };
    let rows = db.recent_metrics(args.limit, args.name.as_deref())?;

    match output_mode(cli) {
        OutputMode::Human => {
            if rows.is_empty() {
                println!("No telemetry recorded yet.");
                return Ok(());
            }
            println!("  {:<24}  {:<20}  {:>10}", "Timestamp", "Metric", "Value");
            println!("  {}", "-".repeat(58));
            for row in &rows {
                println!(
                    "  {:<24}  {:<20}  {:>10.3}",
                    row.timestamp, row.metric_name, row.metric_value
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "metrics",
                "count": rows.len(),
                "metrics": rows,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn parse_window_duration(s: &str) -> Result<Duration, CliError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(CliError::User("empty window string".to_string()));
    }
    let (digits, suffix) = s.split_at(s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len()));
    let n: u64 = digits
        .parse()
        .map_err(|_| CliError::User(format!("invalid window value: {s}")))?;
    let multiplier = match suffix {
        "s" | "sec" => 1,
        "m" | "min" => 60,
        "h" | "hr" => 3600,
        "d" | "day" => 86400,
        "" => 60, // bare number defaults to minutes
        _ => return Err(CliError::User(format!("unknown window suffix: {suffix}"))),
    };
    Ok(Duration::from_secs(n.saturating_mul(multiplier)))
}

fn run_stats(cli: &Cli, args: &StatsArgs) -> Result<(), CliError> {
    // Parse before touching the database so a bad window is a usage error.
    let specific_window = args
        .window
        .as_deref()
        .map(parse_window_duration)
        .transpose()?;

    let Some(db) = open_existing_store(cli, "stats")? else {
        return Ok(());
    };
    let engine = StatsEngine::new(&db);

    let windows = match specific_window {
        Some(window) => vec![engine.window_stats(window)?],
        None => engine.summary()?,
    };

    match output_mode(cli) {
        OutputMode::Human => {
            for ws in &windows {
                println!("── last {} ──", window_label(Duration::from_secs(ws.window_secs)));
                print_window_stats_human(ws);
                println!();
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "stats",
                "windows": windows,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_window_stats_human(ws: &WindowStats) {
    if ws.metrics.is_empty() {
        println!("  Telemetry: (none)");
    } else {
        println!(
            "  {:<16}  {:>6}  {:>9}  {:>9}  {:>9}",
            "Metric", "Count", "Avg", "Min", "Max"
        );
        for m in &ws.metrics {
            println!(
                "  {:<16}  {:>6}  {:>9.2}  {:>9.2}  {:>9.2}",
                m.name, m.count, m.avg, m.min, m.max
            );
        }
    }

    if ws.results.is_empty() {
        println!("  Stressor runs: (none)");
    } else {
        println!(
            "  {:<18}  {:>5}  {:>12}  {:>12}",
            "Computation", "Runs", "Avg ms", "Max ms"
        );
        for r in &ws.results {
            println!(
                "  {:<18}  {:>5}  {:>12.1}  {:>12}",
                r.computation_type, r.runs, r.avg_duration_ms, r.max_duration_ms
            );
        }
    }

    let a = &ws.activity;
    let failures = if a.sink_failures > 0 {
        a.sink_failures.to_string().red().to_string()
    } else {
        a.sink_failures.to_string()
    };
    println!(
        "  Activity: {} completed, {} cancelled, {} drain timeout(s), {failures} sink failure(s)",
        a.stress_runs, a.cancellations, a.drain_timeouts
    );
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let value = serde_json::to_value(&config)?;
                    let payload = json!({
                        "command": "config show",
                        "config": value,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config
                    .stable_hash()
                    .map_err(|e| CliError::Internal(e.to_string()))?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("{}", "Configuration is valid.".green());
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("{} {e}", "Configuration is INVALID:".red());
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "error": e.to_string(),
                            "code": e.code(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Version and output helpers
// ---------------------------------------------------------------------------

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");
    let git_sha = option_env!("GIT_SHA").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("hwl {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
                println!("git_sha: {git_sha}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "hwl",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                    "git_sha": git_sha,
                }
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("HWL_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
