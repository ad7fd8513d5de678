#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the impedance spectrometer.
//!
//! - `Config` and its sections are deserialized from TOML; every section is optional.
//! - `Config::validate` rejects structurally invalid values. Board limits
//!   (frequency window, voltage table, resistor tables) are checked again by
//!   the orchestrator when the settings are applied.
use serde::Deserialize;

/// Bus wiring of the physical board.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Board {
    /// Linux I2C bus number of the converter.
    pub i2c_bus: u8,
    /// 7-bit I2C address of the converter.
    pub converter_address: u8,
    pub router_spi_bus: u8,
    pub router_chip_select: u8,
    pub router_clock_hz: u32,
    /// Converter master clock (internal oscillator by default).
    pub mclk_hz: u32,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            converter_address: 0x0D,
            router_spi_bus: 0,
            router_chip_select: 0,
            router_clock_hz: 1_000_000,
            mclk_hz: 16_776_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SweepCfg {
    pub start_hz: u32,
    pub stop_hz: u32,
    pub increments: u16,
    pub settling_cycles: u16,
    /// 1, 2 or 4
    pub settling_multiplier: u8,
}

impl Default for SweepCfg {
    fn default() -> Self {
        Self {
            start_hz: 1_000,
            stop_hz: 100_000,
            increments: 99,
            settling_cycles: 15,
            settling_multiplier: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RangeCfg {
    /// Output level in millivolts peak-to-peak; must be one of the board's levels.
    pub voltage_mv: u32,
    pub pga_x5: bool,
    pub feedback_ohms: u32,
    pub autorange: bool,
}

impl Default for RangeCfg {
    fn default() -> Self {
        Self {
            voltage_mv: 2000,
            pga_x5: false,
            feedback_ohms: 10_000,
            autorange: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationCfg {
    pub two_point: bool,
    /// Resistor used when a command asks for calibration without naming one.
    pub ohms: Option<u32>,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            two_point: true,
            ohms: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimerCfg {
    /// Period of the completion-watcher tick (ms).
    pub period_ms: u64,
}

impl Default for TimerCfg {
    fn default() -> Self {
        Self { period_ms: 1 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Timeouts {
    /// Upper bound for blocking measurements and calibration (ms); 0 waits forever.
    pub blocking_ms: u64,
    /// Upper bound for one router transfer (ms).
    pub router_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            blocking_ms: 10_000,
            router_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Parameters of the simulated board used when no hardware is attached.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulatorCfg {
    /// Resistance wired to every port.
    pub load_ohms: f64,
    /// Optional capacitance in parallel with `load_ohms`.
    pub load_capacitance_pf: Option<f64>,
    pub ticks_per_point: u32,
    pub system_gain: f64,
}

impl Default for SimulatorCfg {
    fn default() -> Self {
        Self {
            load_ohms: 1_000.0,
            load_capacitance_pf: None,
            ticks_per_point: 1,
            system_gain: 2_000.0,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub board: Board,
    #[serde(default)]
    pub sweep: SweepCfg,
    #[serde(default)]
    pub range: RangeCfg,
    #[serde(default)]
    pub calibration: CalibrationCfg,
    #[serde(default)]
    pub timer: TimerCfg,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub simulator: SimulatorCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Board
        if self.board.converter_address > 0x7F {
            eyre::bail!("board.converter_address must be a 7-bit address");
        }
        if self.board.router_clock_hz == 0 {
            eyre::bail!("board.router_clock_hz must be > 0");
        }
        if self.board.mclk_hz == 0 {
            eyre::bail!("board.mclk_hz must be > 0");
        }

        // Sweep
        if self.sweep.start_hz >= self.sweep.stop_hz {
            eyre::bail!("sweep.start_hz must be below sweep.stop_hz");
        }
        if !matches!(self.sweep.settling_multiplier, 1 | 2 | 4) {
            eyre::bail!("sweep.settling_multiplier must be 1, 2 or 4");
        }

        // Calibration
        if self.calibration.ohms == Some(0) {
            eyre::bail!("calibration.ohms must be > 0");
        }

        // Timer
        if self.timer.period_ms == 0 {
            eyre::bail!("timer.period_ms must be >= 1");
        }
        if self.timer.period_ms > 1_000 {
            eyre::bail!("timer.period_ms is unreasonably large (>1s)");
        }

        // Timeouts
        if self.timeouts.router_ms == 0 {
            eyre::bail!("timeouts.router_ms must be >= 1");
        }
        if self.timeouts.blocking_ms > 0 && self.timeouts.blocking_ms < self.timer.period_ms {
            eyre::bail!("timeouts.blocking_ms must be 0 or at least timer.period_ms");
        }

        // Logging
        if let Some(rotation) = self.logging.rotation.as_deref()
            && !matches!(rotation, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        // Simulator
        if !(self.simulator.load_ohms.is_finite() && self.simulator.load_ohms > 0.0) {
            eyre::bail!("simulator.load_ohms must be > 0");
        }
        if let Some(pf) = self.simulator.load_capacitance_pf
            && !(pf.is_finite() && pf > 0.0)
        {
            eyre::bail!("simulator.load_capacitance_pf must be > 0");
        }
        if self.simulator.ticks_per_point == 0 {
            eyre::bail!("simulator.ticks_per_point must be >= 1");
        }
        if !(self.simulator.system_gain.is_finite() && self.simulator.system_gain > 0.0) {
            eyre::bail!("simulator.system_gain must be > 0");
        }

        Ok(())
    }
}
