use thiserror::Error;

/// Failure kinds of orchestrator operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpectroError {
    /// An incompatible measurement is in progress; retry once it completes.
    #[error("converter busy")]
    Busy,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("device failure: {0}")]
    DeviceFailure(String),
    #[error("timed out waiting for the converter")]
    Timeout,
}

impl SpectroError {
    /// Stable short name used by the console and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Busy => "BUSY",
            Self::InvalidArgument(_) => "ARG",
            Self::DeviceFailure(_) => "DEVICE",
            Self::Timeout => "TIMEOUT",
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing converter")]
    MissingConverter,
    #[error("missing router")]
    MissingRouter,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Result of an orchestrator operation.
pub type SpectroResult<T> = std::result::Result<T, SpectroError>;

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
