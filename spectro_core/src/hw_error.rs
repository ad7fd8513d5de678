//! Maps `Box<dyn Error>` from trait boundaries to typed `SpectroError`.
//!
//! The traits in `spectro_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `spectro_hardware::HwError` downcasting.

use crate::error::SpectroError;

/// Map a trait-boundary error to a typed `SpectroError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> SpectroError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<spectro_hardware::error::HwError>() {
            return match hw {
                spectro_hardware::error::HwError::Timeout
                | spectro_hardware::error::HwError::DataReadyTimeout => SpectroError::Timeout,
                other => SpectroError::DeviceFailure(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        SpectroError::Timeout
    } else {
        SpectroError::DeviceFailure(s)
    }
}

/// Convenience for `map_err` on boxed trait errors.
pub(crate) fn map_boxed(e: Box<dyn std::error::Error + Send + Sync>) -> SpectroError {
    map_hw_error(&*e)
}
