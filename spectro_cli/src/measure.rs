//! Subcommand runners and result rendering (text table, JSON lines, CSV).

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use serde::Serialize;
use spectro_core::{GainFactor, Orchestrator, PolarPoint, SpectroError, StatusSnapshot};
use spectro_traits::RawSample;

#[derive(Debug, Serialize)]
pub struct PolarRow {
    pub frequency_hz: u32,
    pub magnitude_ohms: f64,
    pub phase_deg: f64,
}

impl From<&PolarPoint> for PolarRow {
    fn from(p: &PolarPoint) -> Self {
        Self {
            frequency_hz: p.frequency_hz,
            magnitude_ohms: p.magnitude_ohms,
            phase_deg: p.phase_deg,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RawRow {
    pub frequency_hz: u32,
    pub real: i16,
    pub imag: i16,
}

impl From<&RawSample> for RawRow {
    fn from(s: &RawSample) -> Self {
        Self {
            frequency_hz: s.frequency_hz,
            real: s.real,
            imag: s.imag,
        }
    }
}

fn emit<T: Serialize>(rows: &[T], json: bool, text: impl Fn(&T) -> String) -> eyre::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for row in rows {
        if json {
            writeln!(out, "{}", serde_json::to_string(row)?)?;
        } else {
            writeln!(out, "{}", text(row))?;
        }
    }
    Ok(())
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> eyre::Result<()> {
    let mut w = csv::Writer::from_path(path)
        .wrap_err_with(|| format!("create CSV {}", path.display()))?;
    for row in rows {
        w.serialize(row)?;
    }
    w.flush()?;
    tracing::info!(path = %path.display(), rows = rows.len(), "CSV written");
    Ok(())
}

fn polar_text(r: &PolarRow) -> String {
    format!(
        "{:>7} Hz  {:>12.2} ohm  {:>8.2} deg",
        r.frequency_hz, r.magnitude_ohms, r.phase_deg
    )
}

fn raw_text(r: &RawRow) -> String {
    format!("{:>7} Hz  re={:>6}  im={:>6}", r.frequency_hz, r.real, r.imag)
}

pub fn describe_gain(g: &GainFactor) -> String {
    match g {
        GainFactor::Uncalibrated => "uncalibrated".to_string(),
        GainFactor::OnePoint(p) => format!(
            "one-point @{} Hz gain={:.6e} phase={:.4} rad",
            p.frequency_hz, p.gain, p.system_phase_rad
        ),
        GainFactor::TwoPoint(a, b) => format!(
            "two-point @{} Hz gain={:.6e} phase={:.4} rad / @{} Hz gain={:.6e} phase={:.4} rad",
            a.frequency_hz, a.gain, a.system_phase_rad, b.frequency_hz, b.gain, b.system_phase_rad
        ),
    }
}

/// Run a sweep to completion, stopping it when `shutdown` is raised.
pub fn run_sweep(
    orch: &mut Orchestrator,
    port: u8,
    calibrate: Option<u32>,
    raw: bool,
    csv: Option<&Path>,
    json: bool,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<()> {
    if let Some(ohms) = calibrate {
        orch.calibrate(ohms).wrap_err("calibration before sweep")?;
    }
    orch.start_sweep(port)?;
    let deadline = orch.timeouts().blocking().map(|t| Instant::now() + t);
    loop {
        if shutdown.load(Ordering::Relaxed) {
            orch.stop_sweep();
            eyre::bail!("sweep interrupted by user");
        }
        let s = orch.status();
        if !s.is_busy() {
            if s.interrupted {
                eyre::bail!("sweep interrupted");
            }
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            orch.stop_sweep();
            return Err(SpectroError::Timeout.into());
        }
        std::thread::sleep(Duration::from_millis(2));
    }

    if raw {
        let rows: Vec<RawRow> = orch.data_raw().iter().map(RawRow::from).collect();
        emit(&rows, json, raw_text)?;
        if let Some(path) = csv {
            write_csv(path, &rows)?;
        }
    } else {
        let rows: Vec<PolarRow> = orch.data_polar().iter().map(PolarRow::from).collect();
        emit(&rows, json, polar_text)?;
        if let Some(path) = csv {
            write_csv(path, &rows)?;
        }
    }
    Ok(())
}

pub fn run_measure(
    orch: &mut Orchestrator,
    port: u8,
    freq: u32,
    calibrate: Option<u32>,
    json: bool,
) -> eyre::Result<()> {
    if let Some(ohms) = calibrate {
        orch.calibrate(ohms).wrap_err("calibration before measurement")?;
    }
    let p = orch.measure_single_frequency(port, freq)?;
    emit(&[PolarRow::from(&p)], json, polar_text)
}

pub fn run_temperature(orch: &mut Orchestrator, json: bool) -> eyre::Result<()> {
    let celsius = orch.measure_temperature()?;
    if json {
        println!("{}", serde_json::json!({ "temperature_c": celsius }));
    } else {
        println!("{celsius:.2} C");
    }
    Ok(())
}

pub fn run_calibrate(
    orch: &mut Orchestrator,
    ohms: Option<u32>,
    cfg: &spectro_config::Config,
    json: bool,
) -> eyre::Result<()> {
    let ohms = ohms
        .or(cfg.calibration.ohms)
        .ok_or_else(|| eyre::eyre!("no calibration resistor given (use --ohms or [calibration] ohms)"))?;
    orch.calibrate(ohms)?;
    let gain = describe_gain(orch.gain_factor());
    if json {
        println!(
            "{}",
            serde_json::json!({ "calibrated": orch.gain_factor().is_calibrated(), "ohms": ohms, "gain": gain })
        );
    } else {
        println!("{gain}");
    }
    Ok(())
}

pub fn status_json(orch: &Orchestrator, s: &StatusSnapshot) -> serde_json::Value {
    let (cycles, mult) = orch.settling_cycles();
    serde_json::json!({
        "status": s.status.as_str(),
        "current_point": s.current_point,
        "total_points": s.total_points,
        "interrupted": s.interrupted,
        "autorange": s.autorange,
        "start_hz": orch.start_frequency(),
        "stop_hz": orch.stop_frequency(),
        "increments": orch.increments(),
        "settling_cycles": cycles,
        "settling_multiplier": mult.factor(),
        "voltage_mv": orch.voltage_range(),
        "pga": orch.pga().factor(),
        "feedback_ohms": orch.feedback(),
        "port": orch.port(),
        "gain": describe_gain(orch.gain_factor()),
    })
}

pub fn run_status(orch: &mut Orchestrator, json: bool) -> eyre::Result<()> {
    let s = orch.status();
    if json {
        println!("{}", status_json(orch, &s));
        return Ok(());
    }
    let (cycles, mult) = orch.settling_cycles();
    println!("{s}");
    println!(
        "sweep: {}..{} Hz, {} increments, settling {} x{}",
        orch.start_frequency(),
        orch.stop_frequency(),
        orch.increments(),
        cycles,
        mult.factor()
    );
    println!(
        "range: {} mV, pga x{}, feedback {} ohm",
        orch.voltage_range(),
        orch.pga().factor(),
        orch.feedback()
    );
    println!("calibration: {}", describe_gain(orch.gain_factor()));
    Ok(())
}

pub fn self_check(orch: &mut Orchestrator, json: bool) -> eyre::Result<()> {
    let celsius = orch
        .measure_temperature()
        .wrap_err("converter did not complete a temperature conversion")?;
    if json {
        println!("{}", serde_json::json!({ "ok": true, "temperature_c": celsius }));
    } else {
        println!("ok (die temperature {celsius:.1} C)");
    }
    Ok(())
}
