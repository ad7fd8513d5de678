mod backend;
mod cli;
mod console;
mod error_fmt;
mod measure;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    if let Err(err) = run(cli) {
        tracing::error!(error = %err, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", error_fmt::format_error_json(&err));
        } else {
            eprintln!("{}", error_fmt::humanize(&err));
        }
        std::process::exit(error_fmt::exit_code_for_error(&err));
    }
}

fn load_config(path: Option<&Path>) -> eyre::Result<spectro_config::Config> {
    match path {
        Some(p) => spectro_config::load_file(p),
        None => Ok(spectro_config::Config::default()),
    }
}

/// Console output goes to stderr so stdout carries only results.
fn init_tracing(cli: &Cli, logging: &spectro_config::Logging) -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .wrap_err("invalid --log-level")?;
    let console = if cli.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name"))?;
            let appender = match logging.rotation.as_deref().unwrap_or("never") {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let level = EnvFilter::try_new(logging.level.as_deref().unwrap_or("info"))
                .wrap_err("invalid logging.level")?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(level)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(file)
        .with(console.with_filter(filter))
        .try_init()
        .wrap_err("install tracing subscriber")
}

fn run(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(&cli, &cfg.logging)?;
    tracing::debug!(config = ?cli.config, "configuration loaded");

    let mut orch = backend::open(&cfg)?;
    let json = cli.json;

    match cli.cmd {
        Commands::Sweep {
            port,
            calibrate,
            raw,
            csv,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let flag = Arc::clone(&shutdown);
                if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
                    tracing::warn!(error = %e, "failed to install Ctrl-C handler; continuing without it");
                }
            }
            measure::run_sweep(
                &mut orch,
                port,
                calibrate,
                raw,
                csv.as_deref(),
                json,
                &shutdown,
            )
        }
        Commands::Measure {
            port,
            freq,
            calibrate,
        } => measure::run_measure(&mut orch, port, freq, calibrate, json),
        Commands::Temperature => measure::run_temperature(&mut orch, json),
        Commands::Calibrate { ohms } => measure::run_calibrate(&mut orch, ohms, &cfg, json),
        Commands::Status => measure::run_status(&mut orch, json),
        Commands::Console => {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            console::run(&mut orch, stdin.lock(), stdout.lock()).wrap_err("console I/O")
        }
        Commands::SelfCheck => measure::self_check(&mut orch, json),
    }
}
