//! Measurement orchestrator: status-gated configuration, sweep lifecycle,
//! blocking single-point operations and calibration sequencing.
//!
//! The orchestrator owns every piece of measurement state except the driver
//! itself, which it shares with the timer through a [`TickHandle`]. Completion
//! is never polled: the watcher publishes edges on a channel and blocking
//! operations suspend on that channel until the edge they need arrives.

use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use spectro_traits::{
    Clock, ConverterStatus, ImpedanceConverter, OutputRouter, PgaGain, RawSample,
    SettlingMultiplier, SweepParams,
};

use crate::calibration::{GainFactor, calibration_data, project};
use crate::config::{CalibrationCfg, RangeSettings, SweepConfig, Timeouts};
use crate::error::{SpectroError, SpectroResult};
use crate::hw_error::map_boxed;
use crate::limits::{
    FEEDBACK_RESISTORS, MAX_SETTLING_CYCLES, calibration_line, frequency_in_range,
    port_in_range, voltage_entry,
};
use crate::results::{PolarPoint, ResultBuffers};
use crate::status::StatusSnapshot;
use crate::timer::TickTimer;
use crate::watcher::{Device, TickHandle, WatcherEvent};

/// Driver type used by the dynamically assembled [`Orchestrator`].
pub type BoxedConverter = Box<dyn ImpedanceConverter + Send>;
/// Router type used by the dynamically assembled [`Orchestrator`].
pub type BoxedRouter = Box<dyn OutputRouter + Send>;

/// Orchestrator over boxed collaborators, as produced by the builder.
pub type Orchestrator = OrchestratorCore<BoxedConverter, BoxedRouter>;

pub struct OrchestratorCore<C: ImpedanceConverter, R: OutputRouter> {
    device: TickHandle<C>,
    events: xch::Receiver<WatcherEvent>,
    router: R,
    sweep: SweepConfig,
    range: RangeSettings,
    calibration: CalibrationCfg,
    gain: GainFactor,
    results: ResultBuffers,
    timeouts: Timeouts,
    port: u8,
    timer: Option<TickTimer>,
}

impl<C: ImpedanceConverter, R: OutputRouter> core::fmt::Debug for OrchestratorCore<C, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("sweep", &self.sweep)
            .field("range", &self.range)
            .field("calibrated", &self.gain.is_calibrated())
            .field("port", &self.port)
            .field("timer_running", &self.timer.is_some())
            .finish()
    }
}

impl<C: ImpedanceConverter, R: OutputRouter> OrchestratorCore<C, R> {
    /// Orchestrator with default settings. See [`crate::OrchestratorBuilder`]
    /// for validated construction from configuration.
    pub fn new(converter: C, router: R) -> Self {
        Self::from_parts(
            converter,
            router,
            SweepConfig::default(),
            RangeSettings::default(),
            CalibrationCfg::default(),
            Timeouts::default(),
        )
    }

    pub(crate) fn from_parts(
        converter: C,
        router: R,
        sweep: SweepConfig,
        range: RangeSettings,
        calibration: CalibrationCfg,
        timeouts: Timeouts,
    ) -> Self {
        let (tx, rx) = xch::unbounded();
        let capacity = usize::from(sweep.total_points());
        Self {
            device: TickHandle::new(Device::new(converter, tx)),
            events: rx,
            router,
            sweep,
            range,
            calibration,
            gain: GainFactor::default(),
            results: ResultBuffers::with_capacity(capacity),
            timeouts,
            port: 0,
            timer: None,
        }
    }

    // ── Event intake ─────────────────────────────────────────────────────────

    /// Drain pending watcher events.
    pub fn sync(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            apply_event(&mut self.results, event);
        }
    }

    /// Drain pending events and read the converter under one lock. Ticks send
    /// while holding the same lock, so every edge up to the returned status
    /// has been applied and none can arrive late for an earlier job.
    fn settle(&mut self) -> (ConverterStatus, u16) {
        let dev = self.device.lock();
        while let Ok(event) = self.events.try_recv() {
            apply_event(&mut self.results, event);
        }
        (dev.converter.status(), dev.converter.sweep_count())
    }

    /// `Busy` unless the converter is `Idle` or `Finished`.
    fn ensure_quiescent(&mut self, op: &'static str) -> SpectroResult<()> {
        let (status, _) = self.settle();
        if status.is_quiescent() {
            Ok(())
        } else {
            tracing::warn!(op, %status, "rejected while busy");
            Err(SpectroError::Busy)
        }
    }

    /// Suspend until the watcher reports the converter leaving `busy`, and
    /// return the state it went to. Resets the converter on timeout.
    fn wait_leaving(&mut self, busy: ConverterStatus) -> SpectroResult<ConverterStatus> {
        let deadline = self.timeouts.blocking().map(|t| Instant::now() + t);
        loop {
            let received = match deadline {
                Some(d) => self.events.recv_deadline(d),
                None => self
                    .events
                    .recv()
                    .map_err(|_| xch::RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(event) => {
                    let left = match event {
                        WatcherEvent::StatusChanged { from, to } if from == busy => Some(to),
                        _ => None,
                    };
                    apply_event(&mut self.results, event);
                    if let Some(to) = left {
                        return Ok(to);
                    }
                }
                Err(xch::RecvTimeoutError::Timeout) => {
                    tracing::warn!(%busy, timeout_ms = self.timeouts.blocking_ms, "blocking wait timed out; resetting converter");
                    self.device.lock().reset();
                    self.sync();
                    return Err(SpectroError::Timeout);
                }
                Err(xch::RecvTimeoutError::Disconnected) => {
                    return Err(SpectroError::DeviceFailure(
                        "completion watcher disconnected".into(),
                    ));
                }
            }
        }
    }

    fn route(&mut self, address: u8) -> SpectroResult<()> {
        self.router
            .select(address, self.timeouts.router())
            .map_err(|e| SpectroError::DeviceFailure(format!("router select {address:#04x}: {e}")))?;
        tracing::debug!(address, "router line selected");
        Ok(())
    }

    // ── Sweep configuration ──────────────────────────────────────────────────

    pub fn set_start_frequency(&mut self, hz: u32) -> SpectroResult<()> {
        self.ensure_quiescent("set_start_frequency")?;
        SweepConfig::check_window(hz, self.sweep.stop_hz, self.sweep.increments)?;
        self.sweep.start_hz = hz;
        Ok(())
    }

    pub fn set_stop_frequency(&mut self, hz: u32) -> SpectroResult<()> {
        self.ensure_quiescent("set_stop_frequency")?;
        SweepConfig::check_window(self.sweep.start_hz, hz, self.sweep.increments)?;
        self.sweep.stop_hz = hz;
        Ok(())
    }

    pub fn set_increments(&mut self, increments: u16) -> SpectroResult<()> {
        self.ensure_quiescent("set_increments")?;
        SweepConfig::check_window(self.sweep.start_hz, self.sweep.stop_hz, increments)?;
        self.sweep.increments = increments;
        Ok(())
    }

    /// Set the whole window at once, so moving it past the current bounds
    /// does not depend on the order of the individual setters.
    pub fn configure_sweep(&mut self, start_hz: u32, stop_hz: u32, increments: u16) -> SpectroResult<()> {
        self.ensure_quiescent("configure_sweep")?;
        SweepConfig::check_window(start_hz, stop_hz, increments)?;
        self.sweep.start_hz = start_hz;
        self.sweep.stop_hz = stop_hz;
        self.sweep.increments = increments;
        Ok(())
    }

    /// `multiplier` must be 1, 2 or 4.
    pub fn set_settling_cycles(&mut self, cycles: u16, multiplier: u8) -> SpectroResult<()> {
        self.ensure_quiescent("set_settling_cycles")?;
        if cycles > MAX_SETTLING_CYCLES {
            return Err(SpectroError::InvalidArgument("too many settling cycles"));
        }
        let multiplier = SettlingMultiplier::from_factor(multiplier)
            .ok_or(SpectroError::InvalidArgument("settling multiplier must be 1, 2 or 4"))?;
        self.sweep.settling_cycles = cycles;
        self.sweep.settling_multiplier = multiplier;
        Ok(())
    }

    pub fn start_frequency(&self) -> u32 {
        self.sweep.start_hz
    }

    pub fn stop_frequency(&self) -> u32 {
        self.sweep.stop_hz
    }

    pub fn increments(&self) -> u16 {
        self.sweep.increments
    }

    /// Per-step increment used by the last (or next) sweep.
    pub fn increment_hz(&self) -> u32 {
        self.sweep.increment_hz
    }

    pub fn settling_cycles(&self) -> (u16, SettlingMultiplier) {
        (self.sweep.settling_cycles, self.sweep.settling_multiplier)
    }

    pub fn sweep_config(&self) -> &SweepConfig {
        &self.sweep
    }

    // ── Analog range ─────────────────────────────────────────────────────────

    pub fn set_voltage_range(&mut self, millivolts: u32) -> SpectroResult<()> {
        self.ensure_quiescent("set_voltage_range")?;
        let (range, attenuation) = voltage_entry(millivolts)
            .ok_or(SpectroError::InvalidArgument("unsupported voltage range"))?;
        self.range.voltage_mv = millivolts;
        self.range.output_range = range;
        self.range.attenuation = attenuation;
        Ok(())
    }

    /// Enable the ×5 input gain. Ignored while autorange is on.
    pub fn set_pga(&mut self, x5: bool) -> SpectroResult<()> {
        self.ensure_quiescent("set_pga")?;
        if self.range.autorange {
            tracing::debug!("pga request ignored under autorange");
            return Ok(());
        }
        self.range.pga = if x5 { PgaGain::X5 } else { PgaGain::X1 };
        Ok(())
    }

    /// Turning autorange on forces the input gain to ×1.
    pub fn set_autorange(&mut self, on: bool) -> SpectroResult<()> {
        self.ensure_quiescent("set_autorange")?;
        self.range.autorange = on;
        if on {
            self.range.pga = PgaGain::X1;
        }
        Ok(())
    }

    /// Select the feedback resistor. Ignored while autorange is on.
    pub fn set_feedback(&mut self, ohms: u32) -> SpectroResult<()> {
        self.ensure_quiescent("set_feedback")?;
        if self.range.autorange {
            tracing::debug!(ohms, "feedback request ignored under autorange");
            return Ok(());
        }
        if !FEEDBACK_RESISTORS.contains(&ohms) {
            return Err(SpectroError::InvalidArgument("unsupported feedback resistor"));
        }
        self.range.feedback_ohms = ohms;
        Ok(())
    }

    pub fn voltage_range(&self) -> u32 {
        self.range.voltage_mv
    }

    pub fn pga(&self) -> PgaGain {
        self.range.pga
    }

    pub fn autorange(&self) -> bool {
        self.range.autorange
    }

    pub fn feedback(&self) -> u32 {
        self.range.feedback_ohms
    }

    pub fn range_settings(&self) -> &RangeSettings {
        &self.range
    }

    // ── Calibration settings ─────────────────────────────────────────────────

    pub fn set_two_point(&mut self, on: bool) {
        self.calibration.two_point = on;
    }

    pub fn two_point(&self) -> bool {
        self.calibration.two_point
    }

    pub fn gain_factor(&self) -> &GainFactor {
        &self.gain
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.timeouts = timeouts;
    }

    // ── Sweep lifecycle ──────────────────────────────────────────────────────

    /// Route `port` and start an asynchronous sweep. Completion arrives via
    /// the watcher; poll [`Self::status`] or read the data afterwards.
    pub fn start_sweep(&mut self, port: u8) -> SpectroResult<()> {
        self.ensure_quiescent("start_sweep")?;
        if !port_in_range(port) {
            return Err(SpectroError::InvalidArgument("port out of range"));
        }
        self.route(port)?;
        self.port = port;
        self.sweep.recompute_increment();
        self.results.clear_raw();
        let sweep = self.sweep.params();
        let range = self.range.params();
        self.device
            .lock()
            .command(|c| c.measure_impedance(&sweep, &range))
            .map_err(map_boxed)?;
        tracing::info!(
            port,
            start_hz = sweep.start_hz,
            increment_hz = sweep.increment_hz,
            points = sweep.points(),
            "sweep started"
        );
        Ok(())
    }

    /// Abort a running sweep and flag the results as interrupted. Always succeeds.
    pub fn stop_sweep(&mut self) {
        let mut dev = self.device.lock();
        while let Ok(event) = self.events.try_recv() {
            apply_event(&mut self.results, event);
        }
        if dev.converter.status() == ConverterStatus::MeasuringImpedance {
            self.results.mark_interrupted();
            dev.reset();
            tracing::info!("sweep interrupted");
        }
    }

    /// Measure one frequency on `port` and return it projected with the
    /// current gain factor. Blocks until the converter finishes.
    pub fn measure_single_frequency(&mut self, port: u8, frequency_hz: u32) -> SpectroResult<PolarPoint> {
        self.ensure_quiescent("measure_single_frequency")?;
        if !port_in_range(port) {
            return Err(SpectroError::InvalidArgument("port out of range"));
        }
        if !frequency_in_range(frequency_hz) {
            return Err(SpectroError::InvalidArgument("frequency out of range"));
        }
        self.route(port)?;
        self.port = port;
        self.results.clear_raw();
        let sweep = SweepParams {
            start_hz: frequency_hz,
            increment_hz: 0,
            increments: 0,
            settling_cycles: self.sweep.settling_cycles,
            settling_multiplier: self.sweep.settling_multiplier,
        };
        let range = self.range.params();
        self.device
            .lock()
            .command(|c| c.measure_impedance(&sweep, &range))
            .map_err(map_boxed)?;

        let ended = self.wait_leaving(ConverterStatus::MeasuringImpedance)?;
        if ended != ConverterStatus::Finished {
            return Err(SpectroError::DeviceFailure(format!(
                "measurement ended in {ended} instead of finished"
            )));
        }
        let point = self
            .results
            .raw()
            .first()
            .map(|s| project(s, &self.gain))
            .ok_or_else(|| SpectroError::DeviceFailure("no sample captured".into()))?;
        tracing::info!(
            port,
            frequency_hz,
            magnitude_ohms = point.magnitude_ohms,
            phase_deg = point.phase_deg,
            "single frequency measured"
        );
        Ok(point)
    }

    /// Die temperature in degrees Celsius. Blocks until the conversion completes.
    pub fn measure_temperature(&mut self) -> SpectroResult<f32> {
        self.ensure_quiescent("measure_temperature")?;
        self.device
            .lock()
            .command(|c| c.measure_temperature())
            .map_err(map_boxed)?;
        self.wait_leaving(ConverterStatus::MeasuringTemperature)?;
        let celsius = self
            .device
            .lock()
            .converter
            .temperature_c()
            .ok_or_else(|| SpectroError::DeviceFailure("no temperature reading".into()))?;
        tracing::info!(celsius, "temperature measured");
        Ok(celsius)
    }

    /// Calibrate against the on-board resistor of `ohms`. A no-op under autorange.
    ///
    /// On any error the previous gain factor stays in effect.
    pub fn calibrate(&mut self, ohms: u32) -> SpectroResult<()> {
        self.ensure_quiescent("calibrate")?;
        if self.range.autorange {
            tracing::info!(ohms, "calibration skipped under autorange");
            return Ok(());
        }
        let line = calibration_line(ohms)
            .ok_or(SpectroError::InvalidArgument("unsupported calibration resistor"))?;
        let cal = calibration_data(ohms, &self.sweep, self.calibration.two_point);
        self.route(line)?;
        let range = self.range.params();
        self.device
            .lock()
            .command(|c| c.calibrate(&cal, &range))
            .map_err(map_boxed)?;
        self.wait_leaving(ConverterStatus::Calibrating)?;

        let readings = self.device.lock().converter.calibration_samples().to_vec();
        let gain = GainFactor::from_calibration(&cal, &readings)?;
        self.gain = gain;
        self.results.invalidate();
        tracing::info!(ohms, frequencies = ?cal.frequencies(), "calibration complete");
        Ok(())
    }

    // ── Status and data ──────────────────────────────────────────────────────

    pub fn status(&mut self) -> StatusSnapshot {
        let (status, captured) = self.settle();
        let current_point = if status == ConverterStatus::MeasuringImpedance {
            captured
        } else {
            u16::try_from(self.results.point_count()).unwrap_or(u16::MAX)
        };
        StatusSnapshot {
            status,
            current_point,
            total_points: self.sweep.total_points(),
            interrupted: self.results.interrupted(),
            autorange: self.range.autorange,
        }
    }

    /// Raw samples of the last completed sweep.
    pub fn data_raw(&mut self) -> &[RawSample] {
        self.sync();
        self.results.raw()
    }

    /// Calibrated samples of the last completed sweep, computed on first read.
    pub fn data_polar(&mut self) -> &[PolarPoint] {
        self.sync();
        self.results.polar(&self.gain)
    }

    /// Port routed by the last sweep or single measurement.
    pub fn port(&self) -> u8 {
        self.port
    }

    // ── Timer ────────────────────────────────────────────────────────────────

    /// Entry point for an externally driven tick.
    pub fn tick_handle(&self) -> TickHandle<C> {
        self.device.clone()
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Stop the periodic tick, joining its thread.
    pub fn stop_timer(&mut self) {
        self.timer = None;
    }
}

/// The single place watcher output changes orchestrator state.
fn apply_event(results: &mut ResultBuffers, event: WatcherEvent) {
    match event {
        WatcherEvent::Finished {
            point_count,
            samples,
        } => {
            tracing::debug!(points = point_count, "sweep finished");
            results.complete(usize::from(point_count), samples);
        }
        WatcherEvent::StatusChanged { from, to } => {
            tracing::trace!(%from, %to, "status change applied");
        }
    }
}

impl<C, R> OrchestratorCore<C, R>
where
    C: ImpedanceConverter + Send + 'static,
    R: OutputRouter,
{
    /// Start the periodic tick on its own thread; replaces a running timer.
    pub fn start_timer<K: Clock + Send + 'static>(&mut self, period: Duration, clock: K) {
        self.timer = None;
        self.timer = Some(TickTimer::spawn(self.device.clone(), period, clock));
    }
}
