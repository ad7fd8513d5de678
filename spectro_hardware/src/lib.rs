//! Board backends for the spectrometer: a simulated board for development and
//! tests, and (with the `hardware` feature on Linux) an AD5933 on I2C plus an
//! SPI output router.
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod ad5933;
pub mod error;
pub mod sim;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod spi_router;
pub mod util;

pub use sim::{Load, SimBoard, SimFaults, SimParams, SimulatedConverter, SimulatedRouter};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use ad5933::Ad5933;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use spi_router::SpiRouter;
