//! Periodic timer thread standing in for the board's timer interrupt.
//!
//! Each `TickTimer` owns exactly one thread that calls [`TickHandle::tick`]
//! once per period. The thread is shut down and joined when the timer drops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use spectro_traits::{Clock, ImpedanceConverter};

use crate::watcher::TickHandle;

pub struct TickTimer {
    ticks: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl TickTimer {
    pub fn spawn<C, K>(handle: TickHandle<C>, period: Duration, clock: K) -> Self
    where
        C: ImpedanceConverter + Send + 'static,
        K: Clock + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let ticks = Arc::new(AtomicU64::new(0));
        let ticks_clone = ticks.clone();
        let period = period.max(Duration::from_micros(100));

        let join_handle = std::thread::spawn(move || {
            let period_us = u64::try_from(period.as_micros()).unwrap_or(u64::MAX);
            tracing::debug!(period_us, "tick timer started");
            while !shutdown_clone.load(Ordering::Relaxed) {
                handle.tick();
                ticks_clone.fetch_add(1, Ordering::Relaxed);
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period);
            }
            tracing::trace!("tick timer exiting cleanly");
        });

        Self {
            ticks,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Timer periods elapsed since spawn.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Drop for TickTimer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("tick timer joined"),
                Err(e) => tracing::warn!(?e, "tick timer panicked during shutdown"),
            }
        }
    }
}
