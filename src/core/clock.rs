/*!
 * Tick Sources
 * Monotonic counters the kernel charges execution time against
 */

use crate::core::types::Ticks;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// A monotonic high-resolution counter measured in scheduler ticks.
///
/// The kernel never reads wall-clock time directly; every elapsed-time
/// measurement goes through this seam so tests can substitute a manually
/// advanced source and make budget accounting deterministic.
pub trait TickSource: Send + Sync {
    fn now(&self) -> Ticks;
}

/// Wall-clock tick source backed by [`Instant`].
pub struct MonotonicClock {
    origin: Instant,
    ticks_per_micro: f64,
}

impl MonotonicClock {
    /// `ticks_per_micro` is the fixed conversion factor between microseconds
    /// of host time and scheduler ticks.
    pub fn new(ticks_per_micro: f64) -> Self {
        Self {
            origin: Instant::now(),
            ticks_per_micro,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl TickSource for MonotonicClock {
    fn now(&self) -> Ticks {
        (self.origin.elapsed().as_micros() as f64 * self.ticks_per_micro) as Ticks
    }
}

/// Manually advanced tick source.
///
/// Executables under test advance it by however many ticks they consume,
/// which lets integration tests assert exact per-tier budget arithmetic.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ticks: Ticks) {
        self.0.fetch_add(ticks, Ordering::Relaxed);
    }
}

impl TickSource for ManualClock {
    fn now(&self) -> Ticks {
        self.0.load(Ordering::Relaxed)
    }
}
