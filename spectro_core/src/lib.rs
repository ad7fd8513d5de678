#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Measurement orchestration for an AD5933-class impedance spectrometer
//! (hardware-agnostic).
//!
//! All hardware interaction goes through `spectro_traits::ImpedanceConverter`
//! and `spectro_traits::OutputRouter`.
//!
//! ## Architecture
//!
//! - **Orchestrator**: status-gated setters, sweep lifecycle, blocking
//!   single-point and temperature measurement, calibration (`orchestrator`)
//! - **Completion watcher**: per-tick edge detection, published as events (`watcher`)
//! - **Timer**: the thread that drives the watcher (`timer`)
//! - **Calibration**: frequency derivation, gain factors, polar projection (`calibration`)
//! - **Results**: raw buffer and the lazily rebuilt polar cache (`results`)
//! - **Limits**: the board's numeric domain (`limits`)
//!
//! ## Threading
//!
//! The converter lives behind one mutex shared with the timer thread. The
//! timer only advances the converter and sends events; every other piece of
//! state belongs to the orchestrator and changes in `apply_event` or in a
//! command on the caller's thread.

pub mod builder;
pub mod calibration;
pub mod config;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod limits;
pub mod mocks;
pub mod orchestrator;
pub mod results;
pub mod status;
pub mod timer;
pub mod watcher;

pub use builder::OrchestratorBuilder;
pub use calibration::{GainFactor, GainPoint};
pub use config::{CalibrationCfg, RangeSettings, SweepConfig, Timeouts};
pub use error::{BuildError, SpectroError, SpectroResult};
pub use orchestrator::{BoxedConverter, BoxedRouter, Orchestrator, OrchestratorCore};
pub use results::PolarPoint;
pub use status::StatusSnapshot;
pub use timer::TickTimer;
pub use watcher::{CompletionWatcher, TickHandle, WatcherEvent};
