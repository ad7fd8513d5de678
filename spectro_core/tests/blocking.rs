//! Blocking operations with the tick timer running on its own thread.

use std::time::Duration;

use spectro_core::{GainFactor, Orchestrator, SpectroError, Timeouts};
use spectro_hardware::{Load, SimBoard, SimFaults, SimulatedRouter};
use spectro_traits::clock::ManualClock;
use spectro_traits::{ConverterStatus, MonotonicClock};

struct Rig {
    orch: Orchestrator,
    board: SimBoard,
    faults: SimFaults,
    router: SimulatedRouter,
}

fn rig_with(timeouts: Timeouts) -> Rig {
    let board = SimBoard::new();
    let converter = board.converter();
    let faults = converter.faults();
    let router = board.router();
    let mut orch = Orchestrator::builder()
        .with_converter(converter)
        .with_router(router.clone())
        .with_timeouts(timeouts)
        .build()
        .unwrap();
    orch.start_timer(Duration::from_millis(1), MonotonicClock::new());
    Rig {
        orch,
        board,
        faults,
        router,
    }
}

fn rig() -> Rig {
    rig_with(Timeouts::default())
}

fn close(actual: f64, expected: f64, rel: f64) -> bool {
    ((actual - expected) / expected).abs() <= rel
}

#[test]
fn single_frequency_returns_one_projected_point() {
    let mut r = rig();
    let p = r.orch.measure_single_frequency(2, 30_000).unwrap();
    assert_eq!(p.frequency_hz, 30_000);
    assert!(p.magnitude_ohms.is_finite() && p.magnitude_ohms > 0.0);
    assert_eq!(r.orch.port(), 2);
    assert_eq!(r.orch.data_raw().len(), 1);
    assert_eq!(r.orch.status().status, ConverterStatus::Finished);
}

#[test]
fn single_frequency_validates_arguments() {
    let mut r = rig();
    for (port, hz) in [(12, 10_000), (0, 999), (0, 100_001)] {
        assert!(matches!(
            r.orch.measure_single_frequency(port, hz),
            Err(SpectroError::InvalidArgument(_))
        ));
    }
    assert!(r.board.selections().is_empty());
}

#[test]
fn temperature_reads_the_die_sensor() {
    let mut r = rig();
    let t = r.orch.measure_temperature().unwrap();
    assert!((t - 24.5).abs() < f32::EPSILON);
    assert_eq!(r.orch.status().status, ConverterStatus::Idle);
}

#[test]
fn two_point_calibration_recovers_a_known_load() {
    let mut r = rig();
    r.board.set_load(3, Load::Resistor { ohms: 2_200.0 });
    assert!(!r.orch.gain_factor().is_calibrated());

    r.orch.calibrate(10_000).unwrap();
    assert!(matches!(r.orch.gain_factor(), GainFactor::TwoPoint(a, b)
        if a.frequency_hz == 25_750 && b.frequency_hz == 75_250));
    assert_eq!(r.board.selections(), vec![0x82]);

    for hz in [5_000, 50_000, 95_000] {
        let p = r.orch.measure_single_frequency(3, hz).unwrap();
        assert!(close(p.magnitude_ohms, 2_200.0, 0.01), "{hz} Hz: {p:?}");
        assert!(p.phase_deg.abs() < 0.5, "{hz} Hz: {p:?}");
    }
}

#[test]
fn one_point_calibration_uses_sweep_center() {
    let mut r = rig();
    r.orch.set_two_point(false);
    r.orch.configure_sweep(10_000, 20_000, 10).unwrap();
    r.orch.calibrate(1_000).unwrap();
    assert!(matches!(r.orch.gain_factor(), GainFactor::OnePoint(p) if p.frequency_hz == 15_000));
}

#[test]
fn capacitive_load_shows_negative_phase_after_calibration() {
    let mut r = rig();
    r.board.set_load(
        4,
        Load::ParallelRc {
            ohms: 10_000.0,
            picofarads: 1_000.0,
        },
    );
    r.orch.calibrate(10_000).unwrap();
    let p = r.orch.measure_single_frequency(4, 20_000).unwrap();
    assert!(p.phase_deg < -30.0, "{p:?}");
    assert!(p.magnitude_ohms < 10_000.0);
}

#[test]
fn sweep_polar_data_is_recomputed_after_calibration() {
    let mut r = rig();
    r.orch.configure_sweep(1_000, 11_000, 10).unwrap();
    r.orch.start_sweep(0).unwrap();
    while r.orch.status().is_busy() {
        std::thread::sleep(Duration::from_millis(1));
    }
    let before = r.orch.data_polar().to_vec();
    assert_eq!(before.len(), 11);

    r.orch.calibrate(1_000).unwrap();
    let after = r.orch.data_polar().to_vec();
    assert_eq!(after.len(), 11);
    assert!(close(after[5].magnitude_ohms, 1_000.0, 0.01), "{:?}", after[5]);
    assert_ne!(before[5].magnitude_ohms, after[5].magnitude_ohms);
}

#[test]
fn unknown_calibration_resistor_keeps_gain_factor() {
    let mut r = rig();
    r.orch.calibrate(1_000).unwrap();
    let gain = *r.orch.gain_factor();
    assert!(matches!(
        r.orch.calibrate(4_700),
        Err(SpectroError::InvalidArgument(_))
    ));
    assert_eq!(r.orch.gain_factor(), &gain);
}

#[test]
fn calibration_is_a_no_op_under_autorange() {
    let mut r = rig();
    r.orch.set_autorange(true).unwrap();
    r.orch.calibrate(1_000).unwrap();
    r.orch.calibrate(4_700).unwrap();
    assert!(!r.orch.gain_factor().is_calibrated());
    assert!(r.board.selections().is_empty());
}

#[test]
fn stalled_converter_times_out_and_is_reset() {
    let mut r = rig_with(Timeouts {
        blocking_ms: 50,
        router_ms: 50,
    });
    r.faults.stall(true);
    assert_eq!(
        r.orch.measure_single_frequency(0, 10_000).unwrap_err(),
        SpectroError::Timeout
    );
    assert_eq!(r.orch.status().status, ConverterStatus::Idle);
    assert_eq!(r.orch.calibrate(1_000), Err(SpectroError::Timeout));
    assert!(!r.orch.gain_factor().is_calibrated());

    r.faults.stall(false);
    assert!(r.orch.measure_temperature().is_ok());
}

#[test]
fn driver_rejection_during_calibration_is_a_device_failure() {
    let mut r = rig();
    r.faults.fail_commands(true);
    assert!(matches!(
        r.orch.calibrate(1_000),
        Err(SpectroError::DeviceFailure(_))
    ));
    assert!(matches!(
        r.orch.measure_temperature(),
        Err(SpectroError::DeviceFailure(_))
    ));
    assert!(!r.orch.gain_factor().is_calibrated());
}

#[test]
fn unresponsive_router_is_a_device_failure() {
    let mut r = rig_with(Timeouts {
        blocking_ms: 1_000,
        router_ms: 5,
    });
    r.router.set_unresponsive(true);
    assert!(matches!(
        r.orch.calibrate(1_000),
        Err(SpectroError::DeviceFailure(_))
    ));
    assert!(matches!(
        r.orch.start_sweep(0),
        Err(SpectroError::DeviceFailure(_))
    ));
    assert_eq!(r.orch.status().status, ConverterStatus::Idle);
}

#[test]
fn timer_can_be_stopped_and_restarted() {
    let mut r = rig();
    assert!(r.orch.is_timer_running());
    r.orch.stop_timer();
    assert!(!r.orch.is_timer_running());
    r.orch.start_timer(Duration::from_millis(1), MonotonicClock::new());
    assert!(r.orch.measure_temperature().is_ok());
}

#[test]
fn back_to_back_commands_only_see_their_own_samples() {
    let board = SimBoard::new();
    board.set_load(1, Load::Resistor { ohms: 100_000.0 });
    let mut orch = Orchestrator::builder()
        .with_converter(board.converter())
        .with_router(board.router())
        .build()
        .unwrap();
    orch.configure_sweep(1_000, 2_000, 1).unwrap();
    // Ticks run back to back so sweep completions race the next command.
    orch.start_timer(Duration::from_millis(1), ManualClock::new());

    for round in 0..2_000 {
        orch.start_sweep(0).unwrap();
        let p = loop {
            match orch.measure_single_frequency(1, 50_000) {
                Err(SpectroError::Busy) => std::thread::yield_now(),
                other => break other.unwrap(),
            }
        };
        assert_eq!(p.frequency_hz, 50_000, "round {round}");
        let raw = orch.data_raw();
        assert_eq!(raw.len(), 1, "round {round}");
        assert_eq!(raw[0].frequency_hz, 50_000, "round {round}");
    }
}
