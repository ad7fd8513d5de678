//! Register-level AD5933 driver over Linux I2C (`rppal`).
//!
//! The driver is tick-driven: commands program the chip and return, and
//! `timer_tick` polls the status register once per period, collecting one
//! DFT result or temperature reading whenever the chip flags it valid.

use rppal::i2c::I2c;
use spectro_traits::{
    CalibrationData, ConverterStatus, ImpedanceConverter, OutputRange, PgaGain, RangeParams,
    RawSample, SettlingMultiplier, SweepParams,
};
use std::time::Duration;

use crate::error::{HwError, Result};
use crate::util::poll_until;

pub const DEFAULT_ADDRESS: u16 = 0x0D;
/// Internal oscillator frequency.
pub const DEFAULT_MCLK_HZ: u32 = 16_776_000;

mod reg {
    pub const CONTROL_HI: u8 = 0x80;
    pub const CONTROL_LO: u8 = 0x81;
    pub const START_FREQ: u8 = 0x82;
    pub const FREQ_INC: u8 = 0x85;
    pub const NUM_INC: u8 = 0x88;
    pub const SETTLING: u8 = 0x8A;
    pub const STATUS: u8 = 0x8F;
    pub const TEMP: u8 = 0x92;
    pub const REAL: u8 = 0x94;
    pub const IMAG: u8 = 0x96;
}

mod cmd {
    pub const INIT_START_FREQ: u8 = 0x10;
    pub const START_SWEEP: u8 = 0x20;
    pub const INCREMENT: u8 = 0x30;
    pub const MEASURE_TEMP: u8 = 0x90;
    pub const POWER_DOWN: u8 = 0xA0;
    pub const STANDBY: u8 = 0xB0;
    pub const RESET: u8 = 0x10;
    pub const SET_POINTER: u8 = 0xB0;
}

mod status_bit {
    pub const TEMP_VALID: u8 = 0x01;
    pub const DATA_VALID: u8 = 0x02;
    pub const SWEEP_DONE: u8 = 0x04;
}

#[derive(Debug, Clone, Copy)]
enum Job {
    None,
    Sweep { params: SweepParams },
    Calibration { cal: CalibrationData, index: usize },
    Temperature,
}

pub struct Ad5933 {
    i2c: I2c,
    mclk_hz: u32,
    status: ConverterStatus,
    job: Job,
    range: RangeParams,
    samples: Vec<RawSample>,
    cal_samples: Vec<RawSample>,
    temperature: Option<f32>,
    settling: (u16, SettlingMultiplier),
}

fn i2c_err(e: rppal::i2c::Error) -> HwError {
    HwError::I2c(e.to_string())
}

/// 24-bit frequency code: `f / (MCLK / 4) * 2^27`.
pub fn frequency_code(hz: u32, mclk_hz: u32) -> u32 {
    let code = (u64::from(hz) << 27) / (u64::from(mclk_hz) / 4).max(1);
    (code as u32) & 0x00FF_FFFF
}

fn range_bits(range: OutputRange) -> u8 {
    match range {
        OutputRange::Range1 => 0b00,
        OutputRange::Range2 => 0b11,
        OutputRange::Range3 => 0b10,
        OutputRange::Range4 => 0b01,
    }
}

fn settling_word(cycles: u16, mult: SettlingMultiplier) -> u16 {
    let m: u16 = match mult {
        SettlingMultiplier::X1 => 0b00,
        SettlingMultiplier::X2 => 0b01,
        SettlingMultiplier::X4 => 0b11,
    };
    (m << 9) | (cycles & 0x01FF)
}

impl Ad5933 {
    pub fn open(bus: u8, address: u16, mclk_hz: u32) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus).map_err(i2c_err)?;
        i2c.set_slave_address(address).map_err(i2c_err)?;
        let mut dev = Self {
            i2c,
            mclk_hz,
            status: ConverterStatus::Uninitialized,
            job: Job::None,
            range: RangeParams::default(),
            samples: Vec::new(),
            cal_samples: Vec::new(),
            temperature: None,
            settling: (15, SettlingMultiplier::X1),
        };
        dev.write_reg(reg::CONTROL_LO, cmd::RESET)?;
        dev.control(cmd::STANDBY)?;
        dev.status = ConverterStatus::Idle;
        tracing::info!(bus, address, mclk_hz, "ad5933 ready");
        Ok(dev)
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<()> {
        self.i2c.write(&[reg, value]).map_err(i2c_err)?;
        Ok(())
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8> {
        self.i2c
            .write(&[cmd::SET_POINTER, reg])
            .map_err(i2c_err)?;
        let mut buf = [0u8; 1];
        self.i2c.read(&mut buf).map_err(i2c_err)?;
        Ok(buf[0])
    }

    fn read_word(&mut self, reg: u8) -> Result<u16> {
        let hi = self.read_reg(reg)?;
        let lo = self.read_reg(reg + 1)?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn write_u24(&mut self, reg: u8, value: u32) -> Result<()> {
        let [_, a, b, c] = value.to_be_bytes();
        self.write_reg(reg, a)?;
        self.write_reg(reg + 1, b)?;
        self.write_reg(reg + 2, c)
    }

    fn write_u16(&mut self, reg: u8, value: u16) -> Result<()> {
        let [a, b] = value.to_be_bytes();
        self.write_reg(reg, a)?;
        self.write_reg(reg + 1, b)
    }

    /// Write the command nibble together with range and PGA bits.
    fn control(&mut self, command: u8) -> Result<()> {
        let pga_x1 = u8::from(self.range.pga == PgaGain::X1);
        let value = command | (range_bits(self.range.output_range) << 1) | pga_x1;
        self.write_reg(reg::CONTROL_HI, value)
    }

    fn program(&mut self, start_hz: u32, increment_hz: u32, increments: u16) -> Result<()> {
        self.write_u24(reg::START_FREQ, frequency_code(start_hz, self.mclk_hz))?;
        self.write_u24(reg::FREQ_INC, frequency_code(increment_hz, self.mclk_hz))?;
        self.write_u16(reg::NUM_INC, increments & 0x01FF)?;
        let (cycles, mult) = self.settling;
        self.write_u16(reg::SETTLING, settling_word(cycles, mult))?;
        self.control(cmd::STANDBY)?;
        self.control(cmd::INIT_START_FREQ)?;
        self.control(cmd::START_SWEEP)
    }

    fn read_dft(&mut self, frequency_hz: u32) -> Result<RawSample> {
        let real = self.read_word(reg::REAL)? as i16;
        let imag = self.read_word(reg::IMAG)? as i16;
        Ok(RawSample {
            frequency_hz,
            real,
            imag,
        })
    }

    fn read_temperature(&mut self) -> Result<f32> {
        let raw = self.read_word(reg::TEMP)? & 0x3FFF;
        // 14-bit two's complement, 1/32 degree per LSB.
        let signed = if raw & 0x2000 != 0 {
            i32::from(raw) - 0x4000
        } else {
            i32::from(raw)
        };
        Ok(signed as f32 / 32.0)
    }

    fn finish(&mut self, status: ConverterStatus) {
        self.job = Job::None;
        self.status = status;
        if let Err(e) = self.control(cmd::POWER_DOWN) {
            tracing::warn!(error = %e, "ad5933 power-down failed");
        }
    }

    fn service(&mut self) -> Result<()> {
        let st = self.read_reg(reg::STATUS)?;
        match self.job {
            Job::None => {}
            Job::Sweep { params } => {
                if st & status_bit::DATA_VALID == 0 {
                    return Ok(());
                }
                let index = u16::try_from(self.samples.len()).unwrap_or(u16::MAX);
                let sample = self.read_dft(params.frequency_at(index))?;
                self.samples.push(sample);
                if st & status_bit::SWEEP_DONE != 0 || self.samples.len() >= usize::from(params.points()) {
                    self.finish(ConverterStatus::Finished);
                } else {
                    self.control(cmd::INCREMENT)?;
                }
            }
            Job::Calibration { cal, index } => {
                if st & status_bit::DATA_VALID == 0 {
                    return Ok(());
                }
                let freqs = cal.frequencies();
                let sample = self.read_dft(freqs[index])?;
                self.cal_samples.push(sample);
                let next = index + 1;
                if next >= freqs.len() {
                    self.finish(ConverterStatus::Idle);
                } else {
                    self.job = Job::Calibration { cal, index: next };
                    self.program(freqs[next], 0, 0)?;
                }
            }
            Job::Temperature => {
                if st & status_bit::TEMP_VALID != 0 {
                    self.temperature = Some(self.read_temperature()?);
                    self.finish(ConverterStatus::Idle);
                }
            }
        }
        Ok(())
    }

    /// Block until the chip reports valid temperature data; used during bring-up checks.
    pub fn wait_temperature_valid(&mut self, timeout: Duration) -> Result<()> {
        self.control(cmd::MEASURE_TEMP)?;
        poll_until(
            || Ok(self.read_reg(reg::STATUS)? & status_bit::TEMP_VALID != 0),
            timeout,
            Duration::from_millis(1),
        )
        .map_err(|e| match e {
            HwError::Timeout => HwError::DataReadyTimeout,
            other => other,
        })
    }

    /// Settling cycles used for the next sweep; the orchestrator passes them
    /// per sweep, this only seeds calibration runs.
    pub fn set_settling(&mut self, cycles: u16, mult: SettlingMultiplier) {
        self.settling = (cycles, mult);
    }
}

impl ImpedanceConverter for Ad5933 {
    fn status(&self) -> ConverterStatus {
        self.status
    }

    fn timer_tick(&mut self) -> ConverterStatus {
        if let Err(e) = self.service() {
            tracing::warn!(error = %e, "ad5933 service failed; resetting");
            self.reset();
        }
        self.status
    }

    fn measure_impedance(
        &mut self,
        sweep: &SweepParams,
        range: &RangeParams,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.range = *range;
        self.settling = (sweep.settling_cycles, sweep.settling_multiplier);
        self.samples.clear();
        self.program(sweep.start_hz, sweep.increment_hz, sweep.increments)?;
        self.job = Job::Sweep { params: *sweep };
        self.status = ConverterStatus::MeasuringImpedance;
        Ok(())
    }

    fn measure_temperature(
        &mut self,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.temperature = None;
        self.control(cmd::MEASURE_TEMP)?;
        self.job = Job::Temperature;
        self.status = ConverterStatus::MeasuringTemperature;
        Ok(())
    }

    fn calibrate(
        &mut self,
        cal: &CalibrationData,
        range: &RangeParams,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.range = *range;
        self.cal_samples.clear();
        self.program(cal.frequencies_hz[0], 0, 0)?;
        self.job = Job::Calibration {
            cal: *cal,
            index: 0,
        };
        self.status = ConverterStatus::Calibrating;
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
        if let Err(e) = self.write_reg(reg::CONTROL_LO, cmd::RESET) {
            tracing::warn!(error = %e, "ad5933 reset write failed");
        }
        self.job = Job::None;
        self.status = ConverterStatus::Idle;
    }
}
