//! Human-readable error descriptions and structured JSON error formatting.

use spectro_core::error::{BuildError, SpectroError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingConverter => {
                "What happened: No impedance converter was provided to the orchestrator.\nLikely causes: The converter failed to initialize or was not wired into the builder.\nHow to fix: Check the [board] I2C settings and that the converter answers on the bus.".to_string()
            }
            BuildError::MissingRouter => {
                "What happened: No output router was provided to the orchestrator.\nLikely causes: The SPI router failed to initialize or was not wired into the builder.\nHow to fix: Check the [board] SPI settings and router power.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Values in [sweep] or [range] outside what the board supports.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<SpectroError>() {
        return match se {
            SpectroError::Busy => "What happened: The converter is busy with another measurement.\nLikely causes: A sweep or calibration is still running.\nHow to fix: Wait for it to finish or stop the sweep, then retry.".to_string(),
            SpectroError::InvalidArgument(msg) => format!(
                "What happened: Invalid argument ({msg}).\nLikely causes: A value outside the board's supported set.\nHow to fix: Ports are 0..=11, frequencies 1000..=100000 Hz; see `spectro status` for current settings."
            ),
            SpectroError::DeviceFailure(msg) => format!(
                "What happened: The board reported a failure ({msg}).\nLikely causes: Wiring, power, or bus settings in [board].\nHow to fix: Run `spectro self-check` and re-run with --log-level=debug."
            ),
            SpectroError::Timeout => "What happened: The converter did not finish in time.\nLikely causes: Timer not running, converter stalled, or timeouts.blocking_ms too low for the sweep.\nHow to fix: Raise timeouts.blocking_ms or reduce the number of increments/settling cycles.".to_string(),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open i2c") || lower.contains("open spi") {
        return "What happened: Failed to open the board's buses.\nLikely causes: Wrong bus numbers or insufficient permissions on /dev/i2c-* or /dev/spidev*.\nHow to fix: Fix [board] in the config; ensure the process may access the devices.".to_string();
    }

    if lower.contains("read config") || lower.contains("parse config") {
        return format!(
            "What happened: The config file could not be loaded.\nLikely causes: Wrong path or TOML syntax error.\nHow to fix: Check the file passed with --config. Original: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error kind; anything untyped is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<SpectroError>() {
        Some(SpectroError::Busy) => 3,
        Some(SpectroError::InvalidArgument(_)) => 4,
        Some(SpectroError::DeviceFailure(_)) => 5,
        Some(SpectroError::Timeout) => 6,
        None => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = err
        .downcast_ref::<SpectroError>()
        .map_or("Error", SpectroError::kind);
    json!({ "reason": reason, "message": humanize(err) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        let cases = [
            (SpectroError::Busy, 3),
            (SpectroError::InvalidArgument("x"), 4),
            (SpectroError::DeviceFailure("x".into()), 5),
            (SpectroError::Timeout, 6),
        ];
        for (e, code) in cases {
            assert_eq!(exit_code_for_error(&eyre::Report::new(e)), code);
        }
        assert_eq!(exit_code_for_error(&eyre::eyre!("plain")), 1);
    }

    #[test]
    fn wrapped_errors_keep_their_kind() {
        use eyre::WrapErr;
        let r: eyre::Result<()> = Err(SpectroError::Timeout).wrap_err("sweep");
        let err = r.unwrap_err();
        assert_eq!(exit_code_for_error(&err), 6);
        assert!(format_error_json(&err).contains("\"TIMEOUT\""));
    }
}
