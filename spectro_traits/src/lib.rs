pub mod clock;
pub mod types;

pub use clock::{Clock, MonotonicClock};
pub use types::{
    CalibrationData, ConverterStatus, OutputRange, PgaGain, RangeParams, RawSample,
    SettlingMultiplier, SweepParams,
};

/// Capability surface of an AD5933-class impedance converter driver.
///
/// Commands (`measure_impedance`, `measure_temperature`, `calibrate`) only start work;
/// progress is made by `timer_tick`, which the owner calls once per timer period.
pub trait ImpedanceConverter {
    /// Current state of the driver state machine.
    fn status(&self) -> ConverterStatus;

    /// Advance the driver by one timer period and return the resulting status.
    fn timer_tick(&mut self) -> ConverterStatus;

    /// Start an asynchronous frequency sweep. Captured samples replace the previous ones.
    fn measure_impedance(
        &mut self,
        sweep: &SweepParams,
        range: &RangeParams,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Start an asynchronous die-temperature conversion.
    fn measure_temperature(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Start measuring the calibration impedance at the frequencies in `cal`.
    fn calibrate(
        &mut self,
        cal: &CalibrationData,
        range: &RangeParams,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Number of sweep points captured so far in the current (or last) sweep.
    fn sweep_count(&self) -> u16;

    /// Raw samples of the current (or last) sweep, in frequency order.
    fn samples(&self) -> &[RawSample];

    /// Raw readings of the calibration impedance from the last `calibrate`.
    fn calibration_samples(&self) -> &[RawSample];

    /// Last completed temperature conversion in degrees Celsius.
    fn temperature_c(&self) -> Option<f32>;

    /// Abort whatever is running and return to `Idle`.
    fn reset(&mut self);
}

/// Single-byte-addressed port / calibration-resistor multiplexer.
pub trait OutputRouter {
    /// Route the converter to `address`, failing if the transfer does not
    /// complete within `timeout`.
    fn select(
        &mut self,
        address: u8,
        timeout: std::time::Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: ImpedanceConverter + ?Sized> ImpedanceConverter for Box<T> {
    fn status(&self) -> ConverterStatus {
        (**self).status()
    }
    fn timer_tick(&mut self) -> ConverterStatus {
        (**self).timer_tick()
    }
    fn measure_impedance(
        &mut self,
        sweep: &SweepParams,
        range: &RangeParams,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).measure_impedance(sweep, range)
    }
    fn measure_temperature(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).measure_temperature()
    }
    fn calibrate(
        &mut self,
        cal: &CalibrationData,
        range: &RangeParams,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).calibrate(cal, range)
    }
    fn sweep_count(&self) -> u16 {
        (**self).sweep_count()
    }
    fn samples(&self) -> &[RawSample] {
        (**self).samples()
    }
    fn calibration_samples(&self) -> &[RawSample] {
        (**self).calibration_samples()
    }
    fn temperature_c(&self) -> Option<f32> {
        (**self).temperature_c()
    }
    fn reset(&mut self) {
        (**self).reset()
    }
}

impl<T: OutputRouter + ?Sized> OutputRouter for Box<T> {
    fn select(
        &mut self,
        address: u8,
        timeout: std::time::Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).select(address, timeout)
    }
}
