//! Runtime configuration store owned by the orchestrator.
//!
//! These are separate from the TOML-deserialized config in `spectro_config`;
//! values only reach them through the orchestrator's validated setters.

use spectro_traits::{OutputRange, PgaGain, RangeParams, SettlingMultiplier, SweepParams};

use crate::error::{SpectroError, SpectroResult};
use crate::limits::{FREQ_MAX_HZ, FREQ_MIN_HZ, MAX_INCREMENTS};

/// Sweep window and settling programming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    pub start_hz: u32,
    pub stop_hz: u32,
    pub increments: u16,
    /// Derived from the window right before each sweep; see `recompute_increment`.
    pub increment_hz: u32,
    pub settling_cycles: u16,
    pub settling_multiplier: SettlingMultiplier,
}

impl Default for SweepConfig {
    fn default() -> Self {
        let mut cfg = Self {
            start_hz: 1_000,
            stop_hz: 100_000,
            increments: 99,
            increment_hz: 0,
            settling_cycles: 15,
            settling_multiplier: SettlingMultiplier::X1,
        };
        cfg.recompute_increment();
        cfg
    }
}

impl SweepConfig {
    /// Check a complete sweep window against the board limits.
    pub fn check_window(start_hz: u32, stop_hz: u32, increments: u16) -> SpectroResult<()> {
        if start_hz < FREQ_MIN_HZ {
            return Err(SpectroError::InvalidArgument("start frequency below minimum"));
        }
        if stop_hz > FREQ_MAX_HZ {
            return Err(SpectroError::InvalidArgument("stop frequency above maximum"));
        }
        if start_hz >= stop_hz {
            return Err(SpectroError::InvalidArgument(
                "start frequency must be below stop frequency",
            ));
        }
        if increments > MAX_INCREMENTS {
            return Err(SpectroError::InvalidArgument("too many increments"));
        }
        if u32::from(increments) > stop_hz - start_hz {
            return Err(SpectroError::InvalidArgument(
                "increments exceed the frequency span",
            ));
        }
        Ok(())
    }

    /// `(stop - start) / increments`, or 0 for a single-point sweep.
    pub fn recompute_increment(&mut self) {
        self.increment_hz = if self.increments == 0 {
            0
        } else {
            (self.stop_hz - self.start_hz) / u32::from(self.increments)
        };
    }

    /// Points the configured sweep produces.
    #[inline]
    pub fn total_points(&self) -> u16 {
        self.increments.saturating_add(1)
    }

    pub fn params(&self) -> SweepParams {
        SweepParams {
            start_hz: self.start_hz,
            increment_hz: self.increment_hz,
            increments: self.increments,
            settling_cycles: self.settling_cycles,
            settling_multiplier: self.settling_multiplier,
        }
    }
}

/// Analog front-end settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSettings {
    /// Requested level as passed to `set_voltage_range`.
    pub voltage_mv: u32,
    pub output_range: OutputRange,
    pub attenuation: u16,
    pub pga: PgaGain,
    pub feedback_ohms: u32,
    /// Switch only; no ranging algorithm runs behind it.
    pub autorange: bool,
}

impl Default for RangeSettings {
    fn default() -> Self {
        Self {
            voltage_mv: 2000,
            output_range: OutputRange::Range1,
            attenuation: 1,
            pga: PgaGain::X1,
            feedback_ohms: 10_000,
            autorange: false,
        }
    }
}

impl RangeSettings {
    pub fn params(&self) -> RangeParams {
        RangeParams {
            output_range: self.output_range,
            attenuation: self.attenuation,
            pga: self.pga,
            feedback_ohms: self.feedback_ohms,
        }
    }
}

/// Calibration behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationCfg {
    /// Calibrate at two frequencies and interpolate; otherwise at the sweep center.
    pub two_point: bool,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self { two_point: true }
    }
}

/// Timeouts for blocking operations and router transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Upper bound for blocking measurements and calibration (ms). 0 waits forever.
    pub blocking_ms: u64,
    /// Bound for one router transfer (ms).
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

impl Timeouts {
    pub fn blocking(&self) -> Option<std::time::Duration> {
        (self.blocking_ms > 0).then(|| std::time::Duration::from_millis(self.blocking_ms))
    }

    pub fn router(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.router_ms.max(1))
    }
}
