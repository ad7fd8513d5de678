//! Completion watcher: the body of the periodic timer interrupt.
//!
//! Every tick advances the converter and compares its status with the one seen
//! on the previous tick. Only edges produce events; the edge into `Finished`
//! additionally carries a snapshot of the captured sweep so the orchestrator
//! can install it in one step. The watcher never touches orchestrator state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel as xch;
use spectro_traits::{ConverterStatus, ImpedanceConverter, RawSample};

/// Messages from the tick path to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum WatcherEvent {
    /// A sweep or single-point measurement completed.
    Finished {
        point_count: u16,
        samples: Vec<RawSample>,
    },
    StatusChanged {
        from: ConverterStatus,
        to: ConverterStatus,
    },
}

/// Edge detector over successive converter statuses.
#[derive(Debug, Default, Clone)]
pub struct CompletionWatcher {
    previous: ConverterStatus,
}

impl CompletionWatcher {
    pub fn new(initial: ConverterStatus) -> Self {
        Self { previous: initial }
    }

    /// Record a status entered by a command so that the next completion is
    /// seen as an edge even if a single tick finishes the whole job.
    pub fn prime(&mut self, status: ConverterStatus) {
        self.previous = status;
    }

    /// Feed the status read back on this tick; returns `(from, to)` on change.
    pub fn observe(&mut self, status: ConverterStatus) -> Option<(ConverterStatus, ConverterStatus)> {
        if status == self.previous {
            return None;
        }
        let from = std::mem::replace(&mut self.previous, status);
        Some((from, status))
    }

    pub fn previous(&self) -> ConverterStatus {
        self.previous
    }
}

/// Converter plus the watcher state shared between the tick and the foreground.
#[derive(Debug)]
pub struct Device<C> {
    pub(crate) converter: C,
    pub(crate) watcher: CompletionWatcher,
    events: xch::Sender<WatcherEvent>,
}

impl<C: ImpedanceConverter> Device<C> {
    pub(crate) fn new(converter: C, events: xch::Sender<WatcherEvent>) -> Self {
        let watcher = CompletionWatcher::new(converter.status());
        Self {
            converter,
            watcher,
            events,
        }
    }

    /// One timer period: advance the converter and publish any status edge.
    pub fn on_tick(&mut self) {
        let status = self.converter.timer_tick();
        let Some((from, to)) = self.watcher.observe(status) else {
            return;
        };
        tracing::debug!(%from, %to, "converter status edge");
        if to == ConverterStatus::Finished {
            let point_count = self.converter.sweep_count();
            let samples = self.converter.samples().to_vec();
            // Receiver gone means the orchestrator was dropped; nothing to notify.
            let _ = self.events.send(WatcherEvent::Finished {
                point_count,
                samples,
            });
        }
        let _ = self.events.send(WatcherEvent::StatusChanged { from, to });
    }

    /// Issue a command and prime the watcher with the state it entered.
    pub(crate) fn command<T>(
        &mut self,
        f: impl FnOnce(&mut C) -> Result<T, Box<dyn std::error::Error + Send + Sync>>,
    ) -> Result<T, Box<dyn std::error::Error + Send + Sync>> {
        let out = f(&mut self.converter)?;
        self.watcher.prime(self.converter.status());
        Ok(out)
    }

    /// Hard reset back to `Idle`; the watcher follows without emitting an edge.
    pub(crate) fn reset(&mut self) {
        self.converter.reset();
        self.watcher.prime(self.converter.status());
    }
}

/// Cloneable handle to the shared device; the only way the tick path reaches it.
#[derive(Debug)]
pub struct TickHandle<C> {
    device: Arc<Mutex<Device<C>>>,
}

impl<C> Clone for TickHandle<C> {
    fn clone(&self) -> Self {
        Self {
            device: Arc::clone(&self.device),
        }
    }
}

impl<C: ImpedanceConverter> TickHandle<C> {
    pub(crate) fn new(device: Device<C>) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
        }
    }

    /// Run one timer period.
    pub fn tick(&self) {
        self.lock().on_tick();
    }

    /// The device holds no invariant a panicking holder could break halfway,
    /// so a poisoned lock is recovered rather than propagated.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Device<C>> {
        self.device.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("device lock poisoned; recovering");
            PoisonError::into_inner(poisoned)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectro_hardware::SimBoard;
    use spectro_traits::{RangeParams, SettlingMultiplier, SweepParams};

    #[test]
    fn observe_reports_only_changes() {
        let mut w = CompletionWatcher::new(ConverterStatus::Idle);
        assert_eq!(w.observe(ConverterStatus::Idle), None);
        assert_eq!(
            w.observe(ConverterStatus::MeasuringImpedance),
            Some((ConverterStatus::Idle, ConverterStatus::MeasuringImpedance))
        );
        assert_eq!(w.observe(ConverterStatus::MeasuringImpedance), None);
        assert_eq!(
            w.observe(ConverterStatus::Finished),
            Some((ConverterStatus::MeasuringImpedance, ConverterStatus::Finished))
        );
        assert_eq!(w.observe(ConverterStatus::Finished), None);
    }

    #[test]
    fn finished_edge_is_reported_once_with_samples() {
        let (tx, rx) = xch::unbounded();
        let mut dev = Device::new(SimBoard::new().converter(), tx);
        let sweep = SweepParams {
            start_hz: 1_000,
            increment_hz: 1_000,
            increments: 1,
            settling_cycles: 15,
            settling_multiplier: SettlingMultiplier::X1,
        };
        let range = RangeParams {
            attenuation: 1,
            feedback_ohms: 10_000,
            ..RangeParams::default()
        };
        dev.command(|c| c.measure_impedance(&sweep, &range)).unwrap();
        for _ in 0..5 {
            dev.on_tick();
        }
        let events: Vec<WatcherEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 2, "{events:?}");
        match &events[0] {
            WatcherEvent::Finished {
                point_count,
                samples,
            } => {
                assert_eq!(*point_count, 2);
                assert_eq!(samples.len(), 2);
            }
            other => panic!("expected Finished first, got {other:?}"),
        }
        assert_eq!(
            events[1],
            WatcherEvent::StatusChanged {
                from: ConverterStatus::MeasuringImpedance,
                to: ConverterStatus::Finished
            }
        );
    }

    #[test]
    fn priming_turns_a_finished_to_finished_rerun_into_an_edge() {
        let (tx, rx) = xch::unbounded();
        let mut dev = Device::new(SimBoard::new().converter(), tx);
        dev.watcher.prime(ConverterStatus::Finished);
        let sweep = SweepParams {
            start_hz: 2_000,
            increment_hz: 0,
            increments: 0,
            settling_cycles: 15,
            settling_multiplier: SettlingMultiplier::X1,
        };
        dev.command(|c| c.measure_impedance(&sweep, &RangeParams::default()))
            .unwrap();
        dev.on_tick();
        assert!(
            rx.try_iter()
                .any(|e| matches!(e, WatcherEvent::Finished { point_count: 1, .. }))
        );
    }
}
