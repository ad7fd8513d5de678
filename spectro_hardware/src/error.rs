use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("spi error: {0}")]
    Spi(String),
    #[error("router did not acknowledge in time")]
    Timeout,
    #[error("converter data-ready timeout")]
    DataReadyTimeout,
    #[error("router address {0:#04x} is not wired")]
    UnknownAddress(u8),
    #[error("converter rejected command: {0}")]
    Rejected(&'static str),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
