//! Bridges from `spectro_config` file types to the orchestrator's settings.

use spectro_traits::{ImpedanceConverter, OutputRouter, PgaGain, SettlingMultiplier};

use crate::config::{CalibrationCfg, RangeSettings, SweepConfig, Timeouts};
use crate::error::{SpectroError, SpectroResult};
use crate::limits::{FEEDBACK_RESISTORS, voltage_entry};
use crate::orchestrator::OrchestratorCore;

// ── SweepConfig ──────────────────────────────────────────────────────────────

impl From<&spectro_config::SweepCfg> for SweepConfig {
    fn from(c: &spectro_config::SweepCfg) -> Self {
        let mut sweep = Self {
            start_hz: c.start_hz,
            stop_hz: c.stop_hz,
            increments: c.increments,
            increment_hz: 0,
            settling_cycles: c.settling_cycles,
            settling_multiplier: SettlingMultiplier::from_factor(c.settling_multiplier)
                .unwrap_or_default(),
        };
        sweep.recompute_increment();
        sweep
    }
}

// ── RangeSettings ────────────────────────────────────────────────────────────

impl TryFrom<&spectro_config::RangeCfg> for RangeSettings {
    type Error = SpectroError;

    fn try_from(c: &spectro_config::RangeCfg) -> SpectroResult<Self> {
        let (output_range, attenuation) = voltage_entry(c.voltage_mv)
            .ok_or(SpectroError::InvalidArgument("unsupported voltage range"))?;
        if !FEEDBACK_RESISTORS.contains(&c.feedback_ohms) {
            return Err(SpectroError::InvalidArgument("unsupported feedback resistor"));
        }
        Ok(Self {
            voltage_mv: c.voltage_mv,
            output_range,
            attenuation,
            pga: if c.pga_x5 && !c.autorange {
                PgaGain::X5
            } else {
                PgaGain::X1
            },
            feedback_ohms: c.feedback_ohms,
            autorange: c.autorange,
        })
    }
}

// ── CalibrationCfg ───────────────────────────────────────────────────────────

impl From<&spectro_config::CalibrationCfg> for CalibrationCfg {
    fn from(c: &spectro_config::CalibrationCfg) -> Self {
        Self {
            two_point: c.two_point,
        }
    }
}

// ── Timeouts ─────────────────────────────────────────────────────────────────

impl From<&spectro_config::Timeouts> for Timeouts {
    fn from(c: &spectro_config::Timeouts) -> Self {
        Self {
            blocking_ms: c.blocking_ms,
            router_ms: c.router_ms,
        }
    }
}

impl<C: ImpedanceConverter, R: OutputRouter> OrchestratorCore<C, R> {
    /// Push a loaded config through the validated setters.
    ///
    /// Stops at the first rejected value; settings applied before it stay.
    pub fn apply_settings(&mut self, cfg: &spectro_config::Config) -> SpectroResult<()> {
        let s = &cfg.sweep;
        self.configure_sweep(s.start_hz, s.stop_hz, s.increments)?;
        self.set_settling_cycles(s.settling_cycles, s.settling_multiplier)?;

        let r = &cfg.range;
        self.set_voltage_range(r.voltage_mv)?;
        // Feedback and gain are ignored under autorange, so apply them first.
        self.set_autorange(false)?;
        self.set_feedback(r.feedback_ohms)?;
        self.set_pga(r.pga_x5)?;
        self.set_autorange(r.autorange)?;

        self.set_two_point(cfg.calibration.two_point);
        self.set_timeouts(Timeouts::from(&cfg.timeouts));
        tracing::debug!("configuration applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectro_traits::OutputRange;

    #[test]
    fn sweep_conversion_derives_increment() {
        let c = spectro_config::SweepCfg {
            start_hz: 10_000,
            stop_hz: 20_000,
            increments: 4,
            settling_cycles: 30,
            settling_multiplier: 4,
        };
        let s = SweepConfig::from(&c);
        assert_eq!(s.increment_hz, 2_500);
        assert_eq!(s.settling_multiplier, SettlingMultiplier::X4);
    }

    #[test]
    fn range_conversion_looks_up_voltage_table() {
        let c = spectro_config::RangeCfg {
            voltage_mv: 40,
            pga_x5: true,
            feedback_ohms: 100_000,
            autorange: false,
        };
        let r = RangeSettings::try_from(&c).unwrap();
        assert_eq!(r.output_range, OutputRange::Range3);
        assert_eq!(r.attenuation, 10);
        assert_eq!(r.pga, PgaGain::X5);
    }

    #[test]
    fn range_conversion_forces_unity_gain_under_autorange() {
        let c = spectro_config::RangeCfg {
            autorange: true,
            pga_x5: true,
            ..spectro_config::RangeCfg::default()
        };
        assert_eq!(RangeSettings::try_from(&c).unwrap().pga, PgaGain::X1);
    }

    #[test]
    fn range_conversion_rejects_unknown_values() {
        let c = spectro_config::RangeCfg {
            voltage_mv: 500,
            ..spectro_config::RangeCfg::default()
        };
        assert!(RangeSettings::try_from(&c).is_err());
        let c = spectro_config::RangeCfg {
            feedback_ohms: 4_700,
            ..spectro_config::RangeCfg::default()
        };
        assert!(RangeSettings::try_from(&c).is_err());
    }
}
