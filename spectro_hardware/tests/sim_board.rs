use std::time::Duration;

use rstest::rstest;
use spectro_hardware::{Load, SimBoard, SimParams};
use spectro_traits::{
    CalibrationData, ConverterStatus, ImpedanceConverter, OutputRange, OutputRouter, PgaGain,
    RangeParams, SettlingMultiplier, SweepParams,
};

fn range(output_range: OutputRange, pga: PgaGain) -> RangeParams {
    RangeParams {
        output_range,
        attenuation: 1,
        pga,
        feedback_ohms: 10_000,
    }
}

fn single_point(hz: u32) -> SweepParams {
    SweepParams {
        start_hz: hz,
        increment_hz: 0,
        increments: 0,
        settling_cycles: 15,
        settling_multiplier: SettlingMultiplier::X1,
    }
}

#[rstest]
#[case(OutputRange::Range1, PgaGain::X1, 1.0)]
#[case(OutputRange::Range2, PgaGain::X1, 0.5)]
#[case(OutputRange::Range4, PgaGain::X5, 0.5)]
fn excitation_and_gain_scale_raw_magnitude(
    #[case] output_range: OutputRange,
    #[case] pga: PgaGain,
    #[case] ratio: f64,
) {
    let board = SimBoard::new();
    board.set_load(0, Load::Resistor { ohms: 20_000.0 });
    let mut conv = board.converter();

    conv.measure_impedance(&single_point(5_000), &range(OutputRange::Range1, PgaGain::X1))
        .unwrap();
    conv.timer_tick();
    let reference = conv.samples()[0].magnitude();

    conv.measure_impedance(&single_point(5_000), &range(output_range, pga))
        .unwrap();
    conv.timer_tick();
    let scaled = conv.samples()[0].magnitude();

    assert!(
        (scaled / reference - ratio).abs() < 0.01,
        "reference={reference} scaled={scaled}"
    );
}

#[test]
fn calibration_measures_routed_resistor_and_returns_to_idle() {
    let board = SimBoard::with_params(SimParams {
        ticks_per_point: 2,
        ..SimParams::default()
    });
    let mut router = board.router();
    let mut conv = board.converter();
    router.select(0x82, Duration::from_millis(5)).unwrap();

    let cal = CalibrationData {
        ohms: 10_000,
        two_point: true,
        frequencies_hz: [25_750, 75_250],
    };
    conv.calibrate(&cal, &range(OutputRange::Range1, PgaGain::X1))
        .unwrap();
    let mut ticks = 0;
    while conv.timer_tick() == ConverterStatus::Calibrating {
        ticks += 1;
        assert!(ticks < 10, "calibration never completed");
    }
    assert_eq!(conv.status(), ConverterStatus::Idle);
    let freqs: Vec<u32> = conv
        .calibration_samples()
        .iter()
        .map(|s| s.frequency_hz)
        .collect();
    assert_eq!(freqs, vec![25_750, 75_250]);
    assert_eq!(board.selections(), vec![0x82]);
}

#[test]
fn temperature_conversion_completes_in_one_point_time() {
    let board = SimBoard::new();
    let mut conv = board.converter();
    conv.measure_temperature().unwrap();
    assert_eq!(conv.status(), ConverterStatus::MeasuringTemperature);
    assert_eq!(conv.timer_tick(), ConverterStatus::Idle);
    assert_eq!(conv.temperature_c(), Some(SimParams::default().temperature_c));
}

#[test]
fn injected_faults_reject_commands_after_budget() {
    let board = SimBoard::new();
    let mut conv = board.converter();
    conv.faults().fail_after(1);
    assert!(conv.measure_temperature().is_ok());
    conv.timer_tick();
    assert!(conv.measure_temperature().is_err());
}

#[test]
fn reset_returns_to_idle_mid_sweep() {
    let board = SimBoard::new();
    let mut conv = board.converter();
    let mut sweep = single_point(1_000);
    sweep.increments = 10;
    sweep.increment_hz = 100;
    conv.measure_impedance(&sweep, &range(OutputRange::Range1, PgaGain::X1))
        .unwrap();
    conv.timer_tick();
    conv.reset();
    assert_eq!(conv.status(), ConverterStatus::Idle);
    assert_eq!(conv.timer_tick(), ConverterStatus::Idle);
    assert_eq!(conv.sweep_count(), 1);
}

#[test]
fn uninitialized_converter_powers_on_idle() {
    let board = SimBoard::new();
    let mut conv = spectro_hardware::SimulatedConverter::uninitialized(board);
    assert_eq!(conv.status(), ConverterStatus::Uninitialized);
    conv.power_on();
    assert_eq!(conv.status(), ConverterStatus::Idle);
}
