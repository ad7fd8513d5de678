//! SPI output router: one byte per transfer selects a port or calibration line.
//!
//! The router echoes the previously latched address on MISO, so a selection is
//! confirmed by clocking a no-op byte until the echo matches.

use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use spectro_traits::OutputRouter;
use std::time::Duration;

use crate::error::{HwError, Result};
use crate::util::poll_until;

const NOP: u8 = 0xFF;

pub struct SpiRouter {
    spi: Spi,
}

fn spi_err(e: rppal::spi::Error) -> HwError {
    HwError::Spi(e.to_string())
}

impl SpiRouter {
    pub fn open(bus: u8, chip_select: u8, clock_hz: u32) -> Result<Self> {
        let bus = match bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            _ => Bus::Spi2,
        };
        let ss = match chip_select {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            _ => SlaveSelect::Ss2,
        };
        let spi = Spi::new(bus, ss, clock_hz, Mode::Mode0).map_err(spi_err)?;
        Ok(Self { spi })
    }

    fn transfer(&mut self, byte: u8) -> Result<u8> {
        let mut rx = [0u8; 1];
        self.spi.transfer(&mut rx, &[byte]).map_err(spi_err)?;
        Ok(rx[0])
    }
}

impl OutputRouter for SpiRouter {
    fn select(
        &mut self,
        address: u8,
        timeout: Duration,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.transfer(address)?;
        poll_until(
            || Ok(self.transfer(NOP)? == address),
            timeout,
            Duration::from_micros(100),
        )?;
        tracing::debug!(address, "router selected");
        Ok(())
    }
}
