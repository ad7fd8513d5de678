//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "spectro", version, about = "Impedance spectrometer CLI")]
pub struct Cli {
    /// Path to config TOML; built-in defaults are used when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log and print results as JSON lines instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the configured frequency sweep on one port
    Sweep {
        /// Output port (0..=11)
        #[arg(long)]
        port: u8,
        /// Calibrate against this on-board resistor first (ohms)
        #[arg(long, value_name = "OHMS")]
        calibrate: Option<u32>,
        /// Print raw converter samples instead of calibrated impedance
        #[arg(long, action = ArgAction::SetTrue)]
        raw: bool,
        /// Also write the result table to a CSV file
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },
    /// Measure impedance at a single frequency
    Measure {
        /// Output port (0..=11)
        #[arg(long)]
        port: u8,
        /// Excitation frequency in Hz
        #[arg(long, value_name = "HZ")]
        freq: u32,
        /// Calibrate against this on-board resistor first (ohms)
        #[arg(long, value_name = "OHMS")]
        calibrate: Option<u32>,
    },
    /// Read the converter's die temperature
    Temperature,
    /// Calibrate against an on-board resistor and print the gain factor
    Calibrate {
        /// Calibration resistor in ohms; falls back to [calibration] ohms
        #[arg(long, value_name = "OHMS")]
        ohms: Option<u32>,
    },
    /// Print the effective settings and converter status
    Status,
    /// Line-oriented command console on stdin/stdout
    Console,
    /// Quick health check (hardware presence / sim ok)
    SelfCheck,
}
