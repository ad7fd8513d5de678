//! Raw sweep results and their lazily computed polar projection.

use spectro_traits::RawSample;

use crate::calibration::{GainFactor, project};

/// One calibrated impedance point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarPoint {
    pub frequency_hz: u32,
    pub magnitude_ohms: f64,
    pub phase_deg: f64,
}

#[derive(Debug, Default)]
pub struct ResultBuffers {
    raw: Vec<RawSample>,
    polar: Vec<PolarPoint>,
    polar_valid: bool,
    point_count: usize,
    interrupted: bool,
}

impl ResultBuffers {
    pub fn with_capacity(points: usize) -> Self {
        Self {
            raw: Vec::with_capacity(points),
            polar: Vec::with_capacity(points),
            ..Self::default()
        }
    }

    /// Drop the previous results ahead of a new sweep or single-point measurement.
    pub fn clear_raw(&mut self) {
        self.raw.clear();
        self.polar.clear();
        self.polar_valid = false;
        self.point_count = 0;
    }

    /// Install a completed sweep. Clears `interrupted` and invalidates the polar cache.
    pub fn complete(&mut self, point_count: usize, samples: Vec<RawSample>) {
        self.raw = samples;
        self.point_count = point_count.min(self.raw.len());
        self.interrupted = false;
        self.polar_valid = false;
    }

    pub fn mark_interrupted(&mut self) {
        self.interrupted = true;
    }

    /// Force the next polar read to recompute, e.g. after a new calibration.
    pub fn invalidate(&mut self) {
        self.polar_valid = false;
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn is_polar_valid(&self) -> bool {
        self.polar_valid
    }

    pub fn raw(&self) -> &[RawSample] {
        &self.raw[..self.point_count]
    }

    /// Polar view of the raw buffer, recomputed only when invalidated.
    pub fn polar(&mut self, gain: &GainFactor) -> &[PolarPoint] {
        if !self.polar_valid {
            self.polar.clear();
            self.polar
                .extend(self.raw[..self.point_count].iter().map(|s| project(s, gain)));
            self.polar_valid = true;
            tracing::trace!(points = self.point_count, "polar cache rebuilt");
        }
        &self.polar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(n: u32) -> Vec<RawSample> {
        (0..n)
            .map(|i| RawSample {
                frequency_hz: 1_000 + i * 100,
                real: 1_000,
                imag: -200,
            })
            .collect()
    }

    #[test]
    fn polar_cache_is_reused_until_invalidated() {
        let mut r = ResultBuffers::default();
        r.complete(3, samples(3));
        assert!(!r.is_polar_valid());
        let first = r.polar(&GainFactor::Uncalibrated).to_vec();
        assert!(r.is_polar_valid());

        // A different gain must not leak in while the cache is valid.
        let other = GainFactor::OnePoint(crate::calibration::GainPoint {
            frequency_hz: 1_000,
            gain: 0.5,
            system_phase_rad: 0.0,
        });
        assert_eq!(r.polar(&other), first.as_slice());
        r.invalidate();
        assert_ne!(r.polar(&other), first.as_slice());
    }

    #[test]
    fn completion_clears_interrupted_and_bounds_count() {
        let mut r = ResultBuffers::default();
        r.mark_interrupted();
        r.complete(10, samples(4));
        assert!(!r.interrupted());
        assert_eq!(r.point_count(), 4);
        assert_eq!(r.raw().len(), 4);
    }

    #[test]
    fn clear_raw_empties_both_views() {
        let mut r = ResultBuffers::default();
        r.complete(2, samples(2));
        let _ = r.polar(&GainFactor::Uncalibrated);
        r.clear_raw();
        assert!(r.raw().is_empty());
        assert!(r.polar(&GainFactor::Uncalibrated).is_empty());
    }
}
