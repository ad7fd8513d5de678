//! Helper collaborators for tests and hardware-free setups.

/// A router with nothing behind it; every selection succeeds immediately.
///
/// Useful for boards where the converter is wired straight to a single load.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRouter;

impl spectro_traits::OutputRouter for NullRouter {
    fn select(
        &mut self,
        address: u8,
        _timeout: std::time::Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::trace!(address, "null router selection");
        Ok(())
    }
}

/// A router that rejects every transfer.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingRouter;

impl spectro_traits::OutputRouter for FailingRouter {
    fn select(
        &mut self,
        _address: u8,
        _timeout: std::time::Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("router not connected")))
    }
}
