use spectro_traits::ConverterStatus;

/// Point-in-time view of the measurement state, as reported to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: ConverterStatus,
    /// Points captured so far in the running (or last) sweep.
    pub current_point: u16,
    /// Points the configured sweep produces.
    pub total_points: u16,
    pub interrupted: bool,
    pub autorange: bool,
}

impl StatusSnapshot {
    pub fn is_busy(&self) -> bool {
        !self.status.is_quiescent()
    }
}

impl std::fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "status={} point={}/{} interrupted={} autorange={}",
            self.status,
            self.current_point,
            self.total_points,
            u8::from(self.interrupted),
            u8::from(self.autorange)
        )
    }
}
