//! Calibration frequency derivation, gain factors and raw-to-polar projection.
//!
//! A calibration reading of a known resistor `Z_cal` with raw magnitude `|raw|`
//! gives `gain = 1 / (Z_cal * |raw|)`; an unknown load then reads as
//! `|Z| = 1 / (gain * |raw|)`. The phase of the calibration reading is the
//! system phase, subtracted from every later reading.

use spectro_traits::{CalibrationData, RawSample};

use crate::config::SweepConfig;
use crate::error::{SpectroError, SpectroResult};
use crate::results::PolarPoint;

/// Midpoints between the sweep center and each end of the window.
///
/// Falls back to the window ends when the quarter-span collapses the two
/// midpoints onto each other.
pub fn two_point_frequencies(start_hz: u32, stop_hz: u32) -> (u32, u32) {
    let quarter = stop_hz.saturating_sub(start_hz) / 4;
    let f1 = start_hz + quarter;
    let f2 = stop_hz - quarter;
    if f1 == f2 { (start_hz, stop_hz) } else { (f1, f2) }
}

/// Build the calibration request for `ohms` over the configured sweep window.
pub fn calibration_data(ohms: u32, sweep: &SweepConfig, two_point: bool) -> CalibrationData {
    let frequencies_hz = if two_point {
        let (f1, f2) = two_point_frequencies(sweep.start_hz, sweep.stop_hz);
        [f1, f2]
    } else {
        let center = sweep.start_hz + sweep.stop_hz.saturating_sub(sweep.start_hz) / 2;
        [center, 0]
    };
    CalibrationData {
        ohms,
        two_point,
        frequencies_hz,
    }
}

/// Gain and system phase measured at one calibration frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainPoint {
    pub frequency_hz: u32,
    pub gain: f64,
    pub system_phase_rad: f64,
}

impl GainPoint {
    fn from_sample(ohms: u32, sample: &RawSample) -> SpectroResult<Self> {
        let magnitude = sample.magnitude();
        if magnitude == 0.0 || ohms == 0 {
            return Err(SpectroError::DeviceFailure(format!(
                "calibration reading at {} Hz has zero magnitude",
                sample.frequency_hz
            )));
        }
        Ok(Self {
            frequency_hz: sample.frequency_hz,
            gain: 1.0 / (f64::from(ohms) * magnitude),
            system_phase_rad: sample.phase_rad(),
        })
    }
}

/// Correction applied to every raw sample during polar projection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum GainFactor {
    /// No calibration has completed yet; unity gain, zero system phase.
    #[default]
    Uncalibrated,
    OnePoint(GainPoint),
    /// Linear interpolation between the two points.
    TwoPoint(GainPoint, GainPoint),
}

impl GainFactor {
    /// Derive the gain factor from the driver's readings of the calibration resistor.
    pub fn from_calibration(
        cal: &CalibrationData,
        readings: &[RawSample],
    ) -> SpectroResult<Self> {
        let expected = cal.frequencies().len();
        if readings.len() < expected {
            return Err(SpectroError::DeviceFailure(format!(
                "calibration produced {} of {expected} readings",
                readings.len()
            )));
        }
        let first = GainPoint::from_sample(cal.ohms, &readings[0])?;
        if !cal.two_point {
            return Ok(Self::OnePoint(first));
        }
        let second = GainPoint::from_sample(cal.ohms, &readings[1])?;
        Ok(Self::TwoPoint(first, second))
    }

    pub fn is_calibrated(&self) -> bool {
        !matches!(self, Self::Uncalibrated)
    }

    /// `(gain, system_phase_rad)` at `frequency_hz`.
    pub fn at(&self, frequency_hz: u32) -> (f64, f64) {
        match self {
            Self::Uncalibrated => (1.0, 0.0),
            Self::OnePoint(p) => (p.gain, p.system_phase_rad),
            Self::TwoPoint(a, b) => {
                if a.frequency_hz == b.frequency_hz {
                    return (a.gain, a.system_phase_rad);
                }
                let t = (f64::from(frequency_hz) - f64::from(a.frequency_hz))
                    / (f64::from(b.frequency_hz) - f64::from(a.frequency_hz));
                (
                    a.gain + t * (b.gain - a.gain),
                    a.system_phase_rad + t * (b.system_phase_rad - a.system_phase_rad),
                )
            }
        }
    }
}

/// Calibrated impedance magnitude in ohms. An all-zero reading maps to infinity.
pub fn magnitude(sample: &RawSample, gain: &GainFactor) -> f64 {
    let (g, _) = gain.at(sample.frequency_hz);
    let raw = sample.magnitude();
    if raw == 0.0 || g == 0.0 {
        f64::INFINITY
    } else {
        1.0 / (g * raw)
    }
}

/// Calibrated phase in degrees, wrapped to (-180, 180].
pub fn phase(sample: &RawSample, gain: &GainFactor) -> f64 {
    let (_, system) = gain.at(sample.frequency_hz);
    wrap_degrees((sample.phase_rad() - system).to_degrees())
}

pub fn project(sample: &RawSample, gain: &GainFactor) -> PolarPoint {
    PolarPoint {
        frequency_hz: sample.frequency_hz,
        magnitude_ohms: magnitude(sample, gain),
        phase_deg: phase(sample, gain),
    }
}

fn wrap_degrees(deg: f64) -> f64 {
    let d = deg % 360.0;
    if d > 180.0 {
        d - 360.0
    } else if d <= -180.0 {
        d + 360.0
    } else {
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(frequency_hz: u32, real: i16, imag: i16) -> RawSample {
        RawSample {
            frequency_hz,
            real,
            imag,
        }
    }

    #[test]
    fn two_point_frequencies_for_full_window() {
        assert_eq!(two_point_frequencies(1_000, 100_000), (25_750, 75_250));
    }

    #[test]
    fn collapsed_quarter_span_falls_back_to_window_ends() {
        assert_eq!(two_point_frequencies(5_000, 5_000), (5_000, 5_000));
        assert_eq!(two_point_frequencies(5_000, 5_003), (5_000, 5_003));
    }

    #[test]
    fn one_point_calibration_uses_center() {
        let sweep = SweepConfig::default();
        let cal = calibration_data(1_000, &sweep, false);
        assert_eq!(cal.frequencies(), &[50_500]);
    }

    #[test]
    fn one_point_gain_recovers_calibration_resistor() {
        let cal = CalibrationData {
            ohms: 1_000,
            two_point: false,
            frequencies_hz: [10_000, 0],
        };
        let reading = sample(10_000, 3_000, 4_000);
        let gf = GainFactor::from_calibration(&cal, &[reading]).unwrap();
        assert!((magnitude(&reading, &gf) - 1_000.0).abs() < 1e-9);
        assert!(phase(&reading, &gf).abs() < 1e-9);
    }

    #[test]
    fn two_point_gain_interpolates_linearly() {
        let a = GainPoint {
            frequency_hz: 10_000,
            gain: 1.0,
            system_phase_rad: 0.0,
        };
        let b = GainPoint {
            frequency_hz: 20_000,
            gain: 3.0,
            system_phase_rad: 1.0,
        };
        let gf = GainFactor::TwoPoint(a, b);
        let (g, p) = gf.at(15_000);
        assert!((g - 2.0).abs() < 1e-12);
        assert!((p - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_magnitude_calibration_is_a_device_failure() {
        let cal = CalibrationData {
            ohms: 100,
            two_point: false,
            frequencies_hz: [10_000, 0],
        };
        let err = GainFactor::from_calibration(&cal, &[sample(10_000, 0, 0)]).unwrap_err();
        assert!(matches!(err, SpectroError::DeviceFailure(_)));
    }

    #[test]
    fn missing_readings_are_a_device_failure() {
        let cal = CalibrationData {
            ohms: 100,
            two_point: true,
            frequencies_hz: [10_000, 20_000],
        };
        let err = GainFactor::from_calibration(&cal, &[sample(10_000, 5, 5)]).unwrap_err();
        assert!(matches!(err, SpectroError::DeviceFailure(_)));
    }

    #[test]
    fn open_circuit_projects_to_infinity() {
        let p = project(&sample(1_000, 0, 0), &GainFactor::Uncalibrated);
        assert!(p.magnitude_ohms.is_infinite());
    }

    #[test]
    fn phase_wraps_into_half_open_interval() {
        assert_eq!(wrap_degrees(190.0), -170.0);
        assert_eq!(wrap_degrees(-180.0), 180.0);
        assert_eq!(wrap_degrees(180.0), 180.0);
    }
}
