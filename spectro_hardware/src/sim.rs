//! Simulated measurement board: converter, output router and the loads behind them.
//!
//! The converter and router halves share the currently routed address, so the
//! converter measures whatever load the router last selected. One sweep point
//! (or calibration point, or temperature conversion) completes every
//! `ticks_per_point` timer ticks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use spectro_traits::{
    CalibrationData, ConverterStatus, ImpedanceConverter, OutputRouter, RangeParams, RawSample,
    SweepParams,
};

use crate::error::HwError;
use crate::util::poll_until;

/// Electrical model of whatever sits on a router line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Load {
    /// Pure resistor.
    Resistor { ohms: f64 },
    /// Resistor in parallel with a capacitor.
    ParallelRc { ohms: f64, picofarads: f64 },
    /// Nothing connected.
    Open,
}

impl Load {
    /// Complex impedance `(re, im)` at `frequency_hz`; `None` for an open line.
    pub fn impedance(&self, frequency_hz: u32) -> Option<(f64, f64)> {
        match *self {
            Load::Resistor { ohms } => Some((ohms, 0.0)),
            Load::ParallelRc { ohms, picofarads } => {
                // Z = R / (1 + jwRC)
                let w = 2.0 * std::f64::consts::PI * f64::from(frequency_hz);
                let wrc = w * ohms * picofarads * 1e-12;
                let den = 1.0 + wrc * wrc;
                Some((ohms / den, -ohms * wrc / den))
            }
            Load::Open => None,
        }
    }
}

/// Tunables of the simulated analog chain.
#[derive(Debug, Clone, Copy)]
pub struct SimParams {
    /// Raw counts produced when the load equals the feedback resistor at 2 Vpp, PGA x1.
    pub system_gain: f64,
    /// System phase at 0 Hz (radians).
    pub system_phase_rad: f64,
    /// Additional system phase per Hz (radians).
    pub phase_slope_rad_per_hz: f64,
    pub ticks_per_point: u32,
    pub temperature_c: f32,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            system_gain: 2000.0,
            system_phase_rad: 0.35,
            phase_slope_rad_per_hz: 2.0e-6,
            ticks_per_point: 1,
            temperature_c: 24.5,
        }
    }
}

/// Calibration resistors wired to the router's calibration lines.
pub const SIM_CALIBRATION_LINES: [(u8, f64); 5] = [
    (0x80, 100.0),
    (0x81, 1_000.0),
    (0x82, 10_000.0),
    (0x83, 100_000.0),
    (0x84, 1_000_000.0),
];

/// Shared wiring of a simulated board. Hand out the two halves with
/// [`SimBoard::converter`] and [`SimBoard::router`].
#[derive(Debug, Clone)]
pub struct SimBoard {
    loads: Arc<Mutex<HashMap<u8, Load>>>,
    selected: Arc<AtomicU8>,
    selections: Arc<Mutex<Vec<u8>>>,
    params: SimParams,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBoard {
    /// Ports 0..=11 carry a 1 kOhm resistor; calibration lines carry the
    /// standard resistor set.
    pub fn new() -> Self {
        Self::with_params(SimParams::default())
    }

    pub fn with_params(params: SimParams) -> Self {
        let mut loads = HashMap::new();
        for port in 0u8..=11 {
            loads.insert(port, Load::Resistor { ohms: 1_000.0 });
        }
        for (line, ohms) in SIM_CALIBRATION_LINES {
            loads.insert(line, Load::Resistor { ohms });
        }
        Self {
            loads: Arc::new(Mutex::new(loads)),
            selected: Arc::new(AtomicU8::new(0)),
            selections: Arc::new(Mutex::new(Vec::new())),
            params,
        }
    }

    /// Wire `load` to router `address`.
    pub fn set_load(&self, address: u8, load: Load) {
        if let Ok(mut loads) = self.loads.lock() {
            loads.insert(address, load);
        }
    }

    /// Every address selected so far, oldest first.
    pub fn selections(&self) -> Vec<u8> {
        self.selections.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn converter(&self) -> SimulatedConverter {
        SimulatedConverter::new(self.clone())
    }

    pub fn router(&self) -> SimulatedRouter {
        SimulatedRouter {
            board: self.clone(),
            unresponsive: Arc::new(AtomicBool::new(false)),
        }
    }

    fn routed_load(&self) -> Load {
        let address = self.selected.load(Ordering::Relaxed);
        self.loads
            .lock()
            .ok()
            .and_then(|l| l.get(&address).copied())
            .unwrap_or(Load::Open)
    }
}

/// Handles for injecting faults into a running [`SimulatedConverter`].
#[derive(Debug, Clone, Default)]
pub struct SimFaults {
    fail_commands: Arc<AtomicBool>,
    stall: Arc<AtomicBool>,
    /// Remaining successful commands before `fail_commands` takes effect.
    fail_after: Arc<AtomicU32>,
}

impl SimFaults {
    /// Reject every command from now on.
    pub fn fail_commands(&self, on: bool) {
        self.fail_commands.store(on, Ordering::Relaxed);
    }

    /// Accept `n` more commands, then reject the rest.
    pub fn fail_after(&self, n: u32) {
        self.fail_after.store(n, Ordering::Relaxed);
        self.fail_commands.store(true, Ordering::Relaxed);
    }

    /// Keep accepting ticks but never make progress.
    pub fn stall(&self, on: bool) {
        self.stall.store(on, Ordering::Relaxed);
    }

    fn check(&self) -> Result<(), HwError> {
        if !self.fail_commands.load(Ordering::Relaxed) {
            return Ok(());
        }
        let left = self.fail_after.load(Ordering::Relaxed);
        if left > 0 {
            self.fail_after.store(left - 1, Ordering::Relaxed);
            return Ok(());
        }
        Err(HwError::Rejected("injected fault"))
    }
}

#[derive(Debug, Clone, Copy)]
enum Job {
    None,
    Sweep { params: SweepParams },
    Calibration { cal: CalibrationData },
    Temperature,
}

/// Tick-driven model of an AD5933 sweeping whatever the router selected.
#[derive(Debug)]
pub struct SimulatedConverter {
    board: SimBoard,
    status: ConverterStatus,
    job: Job,
    range: RangeParams,
    countdown: u32,
    index: u16,
    samples: Vec<RawSample>,
    cal_samples: Vec<RawSample>,
    temperature: Option<f32>,
    faults: SimFaults,
}

impl SimulatedConverter {
    pub fn new(board: SimBoard) -> Self {
        Self {
            board,
            status: ConverterStatus::Idle,
            job: Job::None,
            range: RangeParams::default(),
            countdown: 0,
            index: 0,
            samples: Vec::new(),
            cal_samples: Vec::new(),
            temperature: None,
            faults: SimFaults::default(),
        }
    }

    /// A converter that has not been brought up yet; `power_on` moves it to `Idle`.
    pub fn uninitialized(board: SimBoard) -> Self {
        Self {
            status: ConverterStatus::Uninitialized,
            ..Self::new(board)
        }
    }

    pub fn power_on(&mut self) {
        if self.status == ConverterStatus::Uninitialized {
            self.status = ConverterStatus::Idle;
        }
    }

    /// Fault-injection handles; clones stay linked to this converter.
    pub fn faults(&self) -> SimFaults {
        self.faults.clone()
    }

    fn ticks_per_point(&self) -> u32 {
        self.board.params.ticks_per_point.max(1)
    }

    fn begin(&mut self, status: ConverterStatus, job: Job) {
        self.status = status;
        self.job = job;
        self.index = 0;
        self.countdown = self.ticks_per_point();
    }

    /// Synthesize the DFT output for the routed load at `frequency_hz`.
    fn sample(&self, frequency_hz: u32) -> RawSample {
        let p = &self.board.params;
        let Some((zr, zi)) = self.board.routed_load().impedance(frequency_hz) else {
            return RawSample {
                frequency_hz,
                real: 0,
                imag: 0,
            };
        };
        let z_mag = zr.hypot(zi);
        if z_mag == 0.0 {
            return RawSample {
                frequency_hz,
                real: i16::MAX,
                imag: 0,
            };
        }
        let excitation = f64::from(self.range.output_range.vpp_mv()) / 2000.0
            / f64::from(self.range.attenuation.max(1));
        let feedback = f64::from(self.range.feedback_ohms.max(1));
        let magnitude =
            p.system_gain * (feedback / z_mag) * excitation * f64::from(self.range.pga.factor());
        let phase = p.system_phase_rad
            + p.phase_slope_rad_per_hz * f64::from(frequency_hz)
            + zi.atan2(zr);
        let clamp = |v: f64| v.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
        RawSample {
            frequency_hz,
            real: clamp(magnitude * phase.cos()),
            imag: clamp(magnitude * phase.sin()),
        }
    }
}

impl ImpedanceConverter for SimulatedConverter {
    fn status(&self) -> ConverterStatus {
        self.status
    }

    fn timer_tick(&mut self) -> ConverterStatus {
        if self.faults.stall.load(Ordering::Relaxed) {
            return self.status;
        }
        if matches!(self.job, Job::None) {
            return self.status;
        }
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown > 0 {
            return self.status;
        }
        self.countdown = self.ticks_per_point();
        match self.job {
            Job::Sweep { params } => {
                let s = self.sample(params.frequency_at(self.index));
                self.samples.push(s);
                self.index += 1;
                if self.index >= params.points() {
                    tracing::debug!(points = self.index, "sim sweep complete");
                    self.job = Job::None;
                    self.status = ConverterStatus::Finished;
                }
            }
            Job::Calibration { cal } => {
                let freqs = cal.frequencies();
                let s = self.sample(freqs[usize::from(self.index)]);
                self.cal_samples.push(s);
                self.index += 1;
                if usize::from(self.index) >= freqs.len() {
                    self.job = Job::None;
                    self.status = ConverterStatus::Idle;
                }
            }
            Job::Temperature => {
                self.temperature = Some(self.board.params.temperature_c);
                self.job = Job::None;
                self.status = ConverterStatus::Idle;
            }
            Job::None => {}
        }
        self.status
    }

    fn measure_impedance(
        &mut self,
        sweep: &SweepParams,
        range: &RangeParams,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.faults.check()?;
        self.range = *range;
        self.samples.clear();
        self.samples.reserve(usize::from(sweep.points()));
        self.begin(
            ConverterStatus::MeasuringImpedance,
            Job::Sweep { params: *sweep },
        );
        Ok(())
    }

    fn measure_temperature(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.faults.check()?;
        self.temperature = None;
        self.begin(ConverterStatus::MeasuringTemperature, Job::Temperature);
        Ok(())
    }

    fn calibrate(
        &mut self,
        cal: &CalibrationData,
        range: &RangeParams,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.faults.check()?;
        self.range = *range;
        self.cal_samples.clear();
        self.begin(ConverterStatus::Calibrating, Job::Calibration { cal: *cal });
        Ok(())
    }

    fn sweep_count(&self) -> u16 {
        u16::try_from(self.samples.len()).unwrap_or(u16::MAX)
    }

    fn samples(&self) -> &[RawSample] {
        &self.samples
    }

    fn calibration_samples(&self) -> &[RawSample] {
        &self.cal_samples
    }

    fn temperature_c(&self) -> Option<f32> {
        self.temperature
    }

    fn reset(&mut self) {
        self.job = Job::None;
        self.index = 0;
        self.status = ConverterStatus::Idle;
    }
}

/// Router half of a [`SimBoard`].
#[derive(Debug, Clone)]
pub struct SimulatedRouter {
    board: SimBoard,
    unresponsive: Arc<AtomicBool>,
}

impl SimulatedRouter {
    /// Stop acknowledging transfers; `select` then times out.
    pub fn set_unresponsive(&self, on: bool) {
        self.unresponsive.store(on, Ordering::Relaxed);
    }
}

impl OutputRouter for SimulatedRouter {
    fn select(
        &mut self,
        address: u8,
        timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let unresponsive = self.unresponsive.clone();
        poll_until(
            || Ok(!unresponsive.load(Ordering::Relaxed)),
            timeout,
            Duration::from_micros(200),
        )?;
        self.board.selected.store(address, Ordering::Relaxed);
        if let Ok(mut s) = self.board.selections.lock() {
            s.push(address);
        }
        tracing::debug!(address, "sim router selected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectro_traits::{OutputRange, PgaGain, SettlingMultiplier};

    fn range() -> RangeParams {
        RangeParams {
            output_range: OutputRange::Range1,
            attenuation: 1,
            pga: PgaGain::X1,
            feedback_ohms: 1_000,
        }
    }

    fn sweep(points: u16) -> SweepParams {
        SweepParams {
            start_hz: 10_000,
            increment_hz: 1_000,
            increments: points - 1,
            settling_cycles: 15,
            settling_multiplier: SettlingMultiplier::X1,
        }
    }

    #[test]
    fn sweep_finishes_after_one_tick_per_point() {
        let board = SimBoard::new();
        let mut conv = board.converter();
        conv.measure_impedance(&sweep(3), &range()).unwrap();
        assert_eq!(conv.status(), ConverterStatus::MeasuringImpedance);
        assert_eq!(conv.timer_tick(), ConverterStatus::MeasuringImpedance);
        assert_eq!(conv.timer_tick(), ConverterStatus::MeasuringImpedance);
        assert_eq!(conv.timer_tick(), ConverterStatus::Finished);
        assert_eq!(conv.sweep_count(), 3);
        let freqs: Vec<u32> = conv.samples().iter().map(|s| s.frequency_hz).collect();
        assert_eq!(freqs, vec![10_000, 11_000, 12_000]);
    }

    #[test]
    fn magnitude_scales_with_load() {
        let board = SimBoard::new();
        let mut router = board.router();
        let mut conv = board.converter();
        board.set_load(1, Load::Resistor { ohms: 2_000.0 });

        router.select(0, Duration::from_millis(5)).unwrap();
        conv.measure_impedance(&sweep(1), &range()).unwrap();
        conv.timer_tick();
        let m1k = conv.samples()[0].magnitude();

        router.select(1, Duration::from_millis(5)).unwrap();
        conv.measure_impedance(&sweep(1), &range()).unwrap();
        conv.timer_tick();
        let m2k = conv.samples()[0].magnitude();

        assert!((m1k / m2k - 2.0).abs() < 0.01, "m1k={m1k} m2k={m2k}");
    }

    #[test]
    fn stalled_converter_never_finishes() {
        let board = SimBoard::new();
        let mut conv = board.converter();
        conv.faults().stall(true);
        conv.measure_impedance(&sweep(2), &range()).unwrap();
        for _ in 0..10 {
            assert_eq!(conv.timer_tick(), ConverterStatus::MeasuringImpedance);
        }
    }

    #[test]
    fn unresponsive_router_times_out() {
        let board = SimBoard::new();
        let mut router = board.router();
        router.set_unresponsive(true);
        let err = router.select(3, Duration::from_millis(2)).unwrap_err();
        assert!(err.to_string().contains("acknowledge"));
        assert!(board.selections().is_empty());
    }

    #[test]
    fn parallel_rc_has_negative_reactance() {
        let (re, im) = Load::ParallelRc {
            ohms: 1_000.0,
            picofarads: 100_000.0,
        }
        .impedance(10_000)
        .unwrap();
        assert!(re < 1_000.0);
        assert!(im < 0.0);
    }
}
