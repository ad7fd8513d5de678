//! Type-state builder for [`Orchestrator`].
//!
//! `build()` only exists once both a converter and a router were supplied;
//! `try_build()` is available in any state and reports what is missing.

use std::marker::PhantomData;

use spectro_traits::{ImpedanceConverter, OutputRouter};

use crate::config::{CalibrationCfg, RangeSettings, SweepConfig, Timeouts};
use crate::error::{BuildError, Result};
use crate::limits::{FEEDBACK_RESISTORS, MAX_SETTLING_CYCLES, voltage_entry};
use crate::orchestrator::{BoxedConverter, BoxedRouter, Orchestrator, OrchestratorCore};

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct OrchestratorBuilder<C, R> {
    converter: Option<BoxedConverter>,
    router: Option<BoxedRouter>,
    sweep: Option<SweepConfig>,
    range: Option<RangeSettings>,
    calibration: Option<CalibrationCfg>,
    timeouts: Option<Timeouts>,
    _c: PhantomData<C>,
    _r: PhantomData<R>,
}

impl Default for OrchestratorBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            converter: None,
            router: None,
            sweep: None,
            range: None,
            calibration: None,
            timeouts: None,
            _c: PhantomData,
            _r: PhantomData,
        }
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder<Missing, Missing> {
        OrchestratorBuilder::default()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

/// Single place where builder input is checked against the board limits.
fn validate_and_build(
    converter: BoxedConverter,
    router: BoxedRouter,
    mut sweep: SweepConfig,
    range: RangeSettings,
    calibration: CalibrationCfg,
    timeouts: Timeouts,
) -> Result<Orchestrator> {
    if SweepConfig::check_window(sweep.start_hz, sweep.stop_hz, sweep.increments).is_err() {
        return Err(invalid("sweep window outside the board limits"));
    }
    if sweep.settling_cycles > MAX_SETTLING_CYCLES {
        return Err(invalid("settling cycles above maximum"));
    }
    match voltage_entry(range.voltage_mv) {
        Some((r, att)) if r == range.output_range && att == range.attenuation => {}
        Some(_) => return Err(invalid("output range does not match voltage level")),
        None => return Err(invalid("unsupported voltage range")),
    }
    if !FEEDBACK_RESISTORS.contains(&range.feedback_ohms) {
        return Err(invalid("unsupported feedback resistor"));
    }
    if range.autorange && range.pga != spectro_traits::PgaGain::X1 {
        return Err(invalid("autorange requires unity input gain"));
    }

    sweep.recompute_increment();
    Ok(OrchestratorCore::from_parts(
        converter,
        router,
        sweep,
        range,
        calibration,
        timeouts,
    ))
}

impl<C, R> OrchestratorBuilder<C, R> {
    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<Orchestrator> {
        let converter = self
            .converter
            .ok_or_else(|| eyre::Report::new(BuildError::MissingConverter))?;
        let router = self
            .router
            .ok_or_else(|| eyre::Report::new(BuildError::MissingRouter))?;
        validate_and_build(
            converter,
            router,
            self.sweep.unwrap_or_default(),
            self.range.unwrap_or_default(),
            self.calibration.unwrap_or_default(),
            self.timeouts.unwrap_or_default(),
        )
    }

    pub fn with_sweep(mut self, sweep: SweepConfig) -> Self {
        self.sweep = Some(sweep);
        self
    }

    pub fn with_range(mut self, range: RangeSettings) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_calibration(mut self, calibration: CalibrationCfg) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Take sweep, range, calibration and timeout settings from a loaded config file.
    pub fn with_config(self, cfg: &spectro_config::Config) -> Result<Self> {
        let range = RangeSettings::try_from(&cfg.range)
            .map_err(|e| eyre::Report::new(e).wrap_err("invalid [range] section"))?;
        Ok(self
            .with_sweep(SweepConfig::from(&cfg.sweep))
            .with_range(range)
            .with_calibration(CalibrationCfg::from(&cfg.calibration))
            .with_timeouts(Timeouts::from(&cfg.timeouts)))
    }
}

impl<R> OrchestratorBuilder<Missing, R> {
    pub fn with_converter(
        self,
        converter: impl ImpedanceConverter + Send + 'static,
    ) -> OrchestratorBuilder<Set, R> {
        OrchestratorBuilder {
            converter: Some(Box::new(converter)),
            router: self.router,
            sweep: self.sweep,
            range: self.range,
            calibration: self.calibration,
            timeouts: self.timeouts,
            _c: PhantomData,
            _r: PhantomData,
        }
    }
}

impl<C> OrchestratorBuilder<C, Missing> {
    pub fn with_router(
        self,
        router: impl OutputRouter + Send + 'static,
    ) -> OrchestratorBuilder<C, Set> {
        OrchestratorBuilder {
            converter: self.converter,
            router: Some(Box::new(router)),
            sweep: self.sweep,
            range: self.range,
            calibration: self.calibration,
            timeouts: self.timeouts,
            _c: PhantomData,
            _r: PhantomData,
        }
    }
}

impl OrchestratorBuilder<Set, Set> {
    pub fn build(self) -> Result<Orchestrator> {
        self.try_build()
    }
}
