//! Values exchanged between the orchestrator and a converter driver.

/// State of the converter driver as observed by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConverterStatus {
    #[default]
    Uninitialized,
    Idle,
    MeasuringImpedance,
    MeasuringTemperature,
    Calibrating,
    Finished,
}

impl ConverterStatus {
    /// `Idle` and `Finished` are the only states that accept a new command.
    #[inline]
    pub fn is_quiescent(self) -> bool {
        matches!(self, Self::Idle | Self::Finished)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Idle => "idle",
            Self::MeasuringImpedance => "measuring-impedance",
            Self::MeasuringTemperature => "measuring-temperature",
            Self::Calibrating => "calibrating",
            Self::Finished => "finished",
        }
    }
}

impl core::fmt::Display for ConverterStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One DFT result straight from the converter's real/imaginary registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    pub frequency_hz: u32,
    pub real: i16,
    pub imag: i16,
}

impl RawSample {
    /// Uncalibrated DFT magnitude, `sqrt(re^2 + im^2)`.
    #[inline]
    pub fn magnitude(&self) -> f64 {
        f64::from(self.real).hypot(f64::from(self.imag))
    }

    /// Uncalibrated phase in radians.
    #[inline]
    pub fn phase_rad(&self) -> f64 {
        f64::from(self.imag).atan2(f64::from(self.real))
    }
}

/// Settling-time multiplier applied to the settling cycle count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettlingMultiplier {
    #[default]
    X1,
    X2,
    X4,
}

impl SettlingMultiplier {
    pub fn from_factor(factor: u8) -> Option<Self> {
        match factor {
            1 => Some(Self::X1),
            2 => Some(Self::X2),
            4 => Some(Self::X4),
            _ => None,
        }
    }

    pub fn factor(self) -> u8 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
        }
    }
}

/// Excitation amplitude ranges of the converter output stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputRange {
    /// 2.0 V peak-to-peak
    #[default]
    Range1,
    /// 1.0 V peak-to-peak
    Range2,
    /// 400 mV peak-to-peak
    Range3,
    /// 200 mV peak-to-peak
    Range4,
}

impl OutputRange {
    pub fn vpp_mv(self) -> u32 {
        match self {
            Self::Range1 => 2000,
            Self::Range2 => 1000,
            Self::Range3 => 400,
            Self::Range4 => 200,
        }
    }
}

/// Receive-side programmable gain amplifier setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PgaGain {
    #[default]
    X1,
    X5,
}

impl PgaGain {
    pub fn factor(self) -> u8 {
        match self {
            Self::X1 => 1,
            Self::X5 => 5,
        }
    }
}

/// Sweep programming handed to the driver at sweep start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepParams {
    pub start_hz: u32,
    pub increment_hz: u32,
    pub increments: u16,
    pub settling_cycles: u16,
    pub settling_multiplier: SettlingMultiplier,
}

impl SweepParams {
    /// Points produced by a sweep: the start point plus one per increment.
    #[inline]
    pub fn points(&self) -> u16 {
        self.increments.saturating_add(1)
    }

    /// Frequency of point `index` (0-based).
    #[inline]
    pub fn frequency_at(&self, index: u16) -> u32 {
        self.start_hz
            .saturating_add(self.increment_hz.saturating_mul(u32::from(index)))
    }
}

/// Analog front-end programming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RangeParams {
    pub output_range: OutputRange,
    /// External attenuator ratio after the output stage (1, 10 or 100).
    pub attenuation: u16,
    pub pga: PgaGain,
    pub feedback_ohms: u32,
}

/// Calibration request handed to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationData {
    pub ohms: u32,
    pub two_point: bool,
    /// `frequencies_hz[1]` is meaningful only for two-point calibration.
    pub frequencies_hz: [u32; 2],
}

impl CalibrationData {
    /// The calibration frequencies actually in use.
    pub fn frequencies(&self) -> &[u32] {
        if self.two_point {
            &self.frequencies_hz
        } else {
            &self.frequencies_hz[..1]
        }
    }
}
