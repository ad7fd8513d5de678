//! Numeric domain of the measurement board.
//!
//! These values are part of the board's external contract and must not drift.

use spectro_traits::OutputRange;

pub const FREQ_MIN_HZ: u32 = 1_000;
pub const FREQ_MAX_HZ: u32 = 100_000;
/// Width of the converter's increment-count register (9 bits).
pub const MAX_INCREMENTS: u16 = 511;
/// Width of the converter's settling-cycle field (9 bits).
pub const MAX_SETTLING_CYCLES: u16 = 511;

pub const PORT_MIN: u8 = 0;
pub const PORT_MAX: u8 = 11;

/// Requested output level (mV peak-to-peak at the port) to converter range and
/// external attenuation.
pub const VOLTAGE_TABLE: [(u32, OutputRange, u16); 10] = [
    (2000, OutputRange::Range1, 1),
    (1000, OutputRange::Range2, 1),
    (400, OutputRange::Range3, 1),
    (200, OutputRange::Range4, 1),
    (100, OutputRange::Range2, 10),
    (40, OutputRange::Range3, 10),
    (20, OutputRange::Range4, 10),
    (10, OutputRange::Range2, 100),
    (4, OutputRange::Range3, 100),
    (2, OutputRange::Range4, 100),
];

pub const FEEDBACK_RESISTORS: [u32; 5] = [100, 1_000, 10_000, 100_000, 1_000_000];

/// Calibration resistor value (ohms) to its router line.
pub const CALIBRATION_RESISTORS: [(u32, u8); 5] = [
    (100, 0x80),
    (1_000, 0x81),
    (10_000, 0x82),
    (100_000, 0x83),
    (1_000_000, 0x84),
];

#[inline]
pub fn port_in_range(port: u8) -> bool {
    (PORT_MIN..=PORT_MAX).contains(&port)
}

#[inline]
pub fn frequency_in_range(hz: u32) -> bool {
    (FREQ_MIN_HZ..=FREQ_MAX_HZ).contains(&hz)
}

pub fn voltage_entry(millivolts: u32) -> Option<(OutputRange, u16)> {
    VOLTAGE_TABLE
        .iter()
        .find(|(mv, _, _)| *mv == millivolts)
        .map(|&(_, range, att)| (range, att))
}

/// Router line of a calibration resistor, if the board carries that value.
pub fn calibration_line(ohms: u32) -> Option<u8> {
    CALIBRATION_RESISTORS
        .iter()
        .find(|(r, _)| *r == ohms)
        .map(|&(_, line)| line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voltage_lookup_is_exact() {
        assert_eq!(voltage_entry(1000), Some((OutputRange::Range2, 1)));
        assert_eq!(voltage_entry(20), Some((OutputRange::Range4, 10)));
        assert_eq!(voltage_entry(500), None);
    }

    #[test]
    fn calibration_lines_are_distinct_from_ports() {
        for (_, line) in CALIBRATION_RESISTORS {
            assert!(!port_in_range(line));
        }
        assert_eq!(calibration_line(10_000), Some(0x82));
        assert_eq!(calibration_line(4_700), None);
    }
}
