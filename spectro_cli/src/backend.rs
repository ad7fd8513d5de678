//! Board assembly: converter + router from config, wired into an orchestrator
//! with its tick timer running.

use std::time::Duration;

use eyre::WrapErr;
use spectro_core::Orchestrator;
use spectro_traits::MonotonicClock;

/// Build the orchestrator for the configured board and start its timer.
pub fn open(cfg: &spectro_config::Config) -> eyre::Result<Orchestrator> {
    let builder = Orchestrator::builder().with_config(cfg)?;

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    let builder = {
        let b = &cfg.board;
        let converter =
            spectro_hardware::Ad5933::open(b.i2c_bus, u16::from(b.converter_address), b.mclk_hz)
                .wrap_err("open i2c converter")?;
        let router = spectro_hardware::SpiRouter::open(
            b.router_spi_bus,
            b.router_chip_select,
            b.router_clock_hz,
        )
        .wrap_err("open spi router")?;
        tracing::info!(
            i2c_bus = b.i2c_bus,
            address = b.converter_address,
            spi_bus = b.router_spi_bus,
            "hardware board opened"
        );
        builder.with_converter(converter).with_router(router)
    };

    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    let builder = {
        let board = simulated_board(&cfg.simulator);
        tracing::info!(
            load_ohms = cfg.simulator.load_ohms,
            "using simulated board"
        );
        builder
            .with_converter(board.converter())
            .with_router(board.router())
    };

    let mut orch = builder.build().wrap_err("assemble orchestrator")?;
    orch.start_timer(
        Duration::from_millis(cfg.timer.period_ms),
        MonotonicClock::new(),
    );
    Ok(orch)
}

/// Simulated board with every port wired to the configured load.
#[cfg_attr(all(feature = "hardware", target_os = "linux"), allow(dead_code))]
pub fn simulated_board(sim: &spectro_config::SimulatorCfg) -> spectro_hardware::SimBoard {
    use spectro_hardware::{Load, SimBoard, SimParams};

    let board = SimBoard::with_params(SimParams {
        system_gain: sim.system_gain,
        ticks_per_point: sim.ticks_per_point,
        ..SimParams::default()
    });
    let load = match sim.load_capacitance_pf {
        Some(picofarads) => Load::ParallelRc {
            ohms: sim.load_ohms,
            picofarads,
        },
        None => Load::Resistor {
            ohms: sim.load_ohms,
        },
    };
    for port in spectro_core::limits::PORT_MIN..=spectro_core::limits::PORT_MAX {
        board.set_load(port, load);
    }
    board
}
