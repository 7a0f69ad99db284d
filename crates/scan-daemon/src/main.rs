//! Scan daemon entry point.
//!
//! Loads the configuration, starts a scan driver around the tick counter
//! engine, and supervises it until SIGINT/SIGTERM or the run limit.

mod diagnostics;
mod watch;

use anyhow::{Context, Result};
use clap::Parser;
use scan_common::config::{ConfigError, DriverConfig};
use scan_common::error::ScanError;
use scan_runtime::driver::ScanDriver;
use scan_runtime::engine::TickCounterEngine;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::diagnostics::RunReport;

/// Scan daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "scan-daemon",
    about = "Scan driver daemon - runs an engine cycle on every timer tick",
    version,
    long_about = None
)]
struct Args {
    /// Path to a driver configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Base tick period in milliseconds (overrides config file).
    #[arg(long, short = 'p', value_name = "MS", allow_negative_numbers = true)]
    period_ms: Option<i64>,

    /// Stop after this long, e.g. "2s" or "500ms" (default: until interrupted).
    #[arg(long, short = 'd', value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Attach a debugger thread that logs every published tick.
    #[arg(long)]
    watch_debug: bool,

    /// Print the end-of-run report as JSON on stdout.
    #[arg(long)]
    stats_json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// Arguments passed to the engine's init.
    #[arg(last = true)]
    engine_args: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(&args.log_level);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_status(&e))
        }
    }
}

/// Process status for a failed run. Configuration problems map to the
/// same status as [`ScanError::Config`].
fn exit_status(e: &anyhow::Error) -> u8 {
    let status = if let Some(scan) = e.downcast_ref::<ScanError>() {
        scan.status_code()
    } else if e.downcast_ref::<ConfigError>().is_some() {
        ScanError::Config(String::new()).status_code()
    } else {
        1
    };
    u8::try_from(status).unwrap_or(1)
}

fn run(args: &Args) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting scan daemon");

    let mut config = load_config(args)?;
    if let Some(period_ms) = args.period_ms {
        config.base_period_ms = period_ms;
    }
    info!(
        period = %config.tick_period(),
        policy = %config.overrun_policy,
        realtime = config.realtime.enabled,
        "Configuration loaded"
    );

    let mut driver = ScanDriver::new(TickCounterEngine::new(), config);
    let started = Instant::now();
    driver
        .start(&args.engine_args)
        .context("Failed to start scan driver")?;

    let watcher = if args.watch_debug {
        Some(watch::spawn(driver.context()).context("Failed to spawn debug watcher")?)
    } else {
        None
    };

    let reason = driver
        .supervise(args.duration)
        .context("Scan driver stopped with a fault")?;

    let mut report = RunReport::new(
        driver.state(),
        reason,
        driver.period().as_duration(),
        started.elapsed(),
        driver.stats(),
        driver.cycle_metrics(),
    );
    if let Some(watcher) = watcher {
        report = report.with_debug_ticks(watcher.join()?);
    }

    info!(
        health = %report.health,
        reason = %report.stop_reason,
        ticks = driver.engine().tick(),
        "Scan daemon finished"
    );
    if report.ticks.dropped() > 0 {
        warn!(dropped = report.ticks.dropped(), "Some firings did not run a cycle");
    }

    if args.stats_json {
        println!("{}", report.to_json().context("Failed to encode report")?);
    }
    Ok(())
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!("scan_daemon={level},scan_runtime={level},scan_common={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `SCAN_CONFIG_PATH` environment variable
/// 3. `/etc/scan-driver/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<DriverConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return DriverConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("SCAN_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from SCAN_CONFIG_PATH");
            return DriverConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from SCAN_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "SCAN_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    for candidate in ["/etc/scan-driver/config.toml", "config/default.toml"] {
        let config_path = PathBuf::from(candidate);
        if config_path.exists() {
            info!(?config_path, "Loading config file");
            return DriverConfig::from_file(&config_path)
                .with_context(|| format!("Failed to load config from {config_path:?}"));
        }
    }

    info!("No config file found, using built-in defaults");
    Ok(DriverConfig::default())
}
