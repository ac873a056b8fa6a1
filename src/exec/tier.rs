/*!
 * Tier Executor
 * Fair time division and status bookkeeping within one priority tier
 */

use crate::core::clock::TickSource;
use crate::core::types::{ExecId, Priority, Ticks};
use crate::exec::executable::ExecStatus;
use crate::exec::queue::TierQueue;
use crate::exec::record::{ExecRecord, Registry};
use crate::exec::stats::AtomicKernelStats;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Forced-minimum guarantee for tiers that must not be starved indefinitely
/// by the tiers above them. Bounded starvation, not zero starvation.
#[derive(Debug, Clone, Copy)]
pub struct ForceRun {
    /// Consecutive zero-allowance updates tolerated before a forced run.
    pub max_skips: u32,
    /// Budget granted to the forced run.
    pub force_ticks: Ticks,
}

/// Executes all units of one priority tier within a tick allowance.
pub(crate) struct TierExecutor {
    priority: Priority,
    force: Option<ForceRun>,
    queue: Mutex<TierQueue>,
    skips: AtomicU32,
    registry: Arc<Registry>,
    clock: Arc<dyn TickSource>,
    stats: Arc<AtomicKernelStats>,
}

impl TierExecutor {
    pub fn new(
        priority: Priority,
        force: Option<ForceRun>,
        registry: Arc<Registry>,
        clock: Arc<dyn TickSource>,
        stats: Arc<AtomicKernelStats>,
    ) -> Self {
        Self {
            priority,
            force,
            queue: Mutex::new(TierQueue::default()),
            skips: AtomicU32::new(0),
            registry,
            clock,
            stats,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Enqueue a freshly registered record at the tail of the waiting queue.
    pub fn enqueue(&self, record: ExecRecord) {
        self.queue.lock().waiting.push_back(record);
    }

    /// Remove a killed record from the queues and notify it of termination.
    /// A record that is in flight is not found here; the executor drops it
    /// when the advance returns, because its registry entry is gone.
    pub fn kill(&self, id: ExecId) {
        let record = self.queue.lock().take(id);
        if let Some(mut record) = record {
            debug!("Killed {} unit {} ({})", self.priority, record.id, record.name);
            let name = record.name.clone();
            contained(&name, "on_terminated", || {
                record.unit.on_terminated(&name, record.id)
            });
        }
    }

    /// Run this tier within `allowance` ticks.
    ///
    /// Invoked every update even when the allowance is non-positive, because
    /// the force-run policy may still grant minimal progress.
    pub fn execute(&self, allowance: Ticks) {
        let Some(allowance) = self.apply_force(allowance) else {
            return;
        };

        self.promote();

        let start = self.clock.now();
        let mut remaining = allowance;
        loop {
            let runnable = self.queue.lock().runnable.len();
            if remaining <= 0 || runnable == 0 {
                break;
            }
            // Fair share for this round; later units in the same round may
            // get smaller or zero grants as the remainder shrinks.
            let share = remaining / runnable as Ticks;
            for _ in 0..runnable {
                if remaining <= 0 {
                    break;
                }
                let record = self.queue.lock().runnable.pop_front();
                let Some(record) = record else {
                    break;
                };
                self.run_slice(record, share.min(remaining));
                remaining = allowance - (self.clock.now() - start);
            }
        }
    }

    /// Decide whether a non-positive allowance still produces a run.
    /// Returns the budget to use, or `None` to skip this update.
    fn apply_force(&self, allowance: Ticks) -> Option<Ticks> {
        if allowance > 0 {
            self.skips.store(0, Ordering::Relaxed);
            return Some(allowance);
        }
        let force = self.force?;
        if self.queue.lock().len() == 0 {
            return None;
        }
        let skips = self.skips.fetch_add(1, Ordering::Relaxed) + 1;
        if skips <= force.max_skips {
            trace!("{} tier skipped (no allowance, skip {})", self.priority, skips);
            return None;
        }
        self.skips.store(0, Ordering::Relaxed);
        self.stats.inc_forced_runs();
        debug!(
            "{} tier forced run of {} ticks after {} skips",
            self.priority,
            force.force_ticks,
            skips - 1
        );
        Some(force.force_ticks)
    }

    /// Promotion pass: move every non-sleeping waiting unit into the
    /// runnable queue; sleeping units stay where they are.
    fn promote(&self) {
        let mut queue = self.queue.lock();
        for _ in 0..queue.waiting.len() {
            if let Some(record) = queue.waiting.pop_front() {
                if record.unit.is_sleeping() {
                    queue.waiting.push_back(record);
                } else {
                    queue.runnable.push_back(record);
                }
            }
        }
    }

    /// Advance one record by `grant` ticks and reclassify it.
    ///
    /// No queue lock is held while the unit runs, so a unit may reentrantly
    /// register or kill through the manager without deadlocking.
    fn run_slice(&self, mut record: ExecRecord, grant: Ticks) {
        if !self.registry.contains(record.id) {
            // Killed after being queued; never advance it again.
            self.drop_terminated(record);
            return;
        }

        self.stats.inc_slices();
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| record.unit.execute(grant)));

        let status = match outcome {
            Ok(Ok(status)) => status,
            Ok(Err(error)) => {
                self.fault(record, error);
                return;
            }
            Err(payload) => {
                self.fault(record, panic_error(payload));
                return;
            }
        };

        match status {
            ExecStatus::Finished => {
                // Permanent removal; idempotent if the unit was killed from
                // within its own final slice.
                self.registry.remove(record.id);
                self.stats.inc_finished();
                debug!("{} unit {} ({}) finished", self.priority, record.id, record.name);
            }
            ExecStatus::Interrupted => {
                // Back of the runnable queue: it may get more time later
                // this same update if others finish or yield early.
                self.requeue(record, false);
            }
            ExecStatus::Yielded => {
                // Waits for the next update's promotion pass.
                self.requeue(record, true);
            }
        }
    }

    /// Requeue a record that wants to keep running, unless it was killed
    /// while in flight.
    fn requeue(&self, record: ExecRecord, to_waiting: bool) {
        if !self.registry.contains(record.id) {
            self.drop_terminated(record);
            return;
        }
        let mut queue = self.queue.lock();
        if to_waiting {
            queue.waiting.push_back(record);
        } else {
            queue.runnable.push_back(record);
        }
    }

    /// A fault removes the unit from scheduling; the error is delivered to
    /// the unit's handler and never rethrown to the tier loop.
    fn fault(&self, mut record: ExecRecord, error: anyhow::Error) {
        self.registry.remove(record.id);
        self.stats.inc_faulted();
        warn!(
            "{} unit {} ({}) faulted: {:#}",
            self.priority, record.id, record.name, error
        );
        let name = record.name.clone();
        contained(&name, "on_exception", || {
            record.unit.on_exception(&name, record.id, &error)
        });
    }

    fn drop_terminated(&self, mut record: ExecRecord) {
        debug!(
            "{} unit {} ({}) terminated while scheduled",
            self.priority, record.id, record.name
        );
        let name = record.name.clone();
        contained(&name, "on_terminated", || {
            record.unit.on_terminated(&name, record.id)
        });
    }
}

/// Run a unit notification, containing any panic it raises.
fn contained<F: FnOnce()>(name: &str, what: &str, f: F) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!("Unit {name} panicked in {what}");
    }
}

fn panic_error(payload: Box<dyn std::any::Any + Send>) -> anyhow::Error {
    if let Some(message) = payload.downcast_ref::<&str>() {
        anyhow::anyhow!("unit panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        anyhow::anyhow!("unit panicked: {message}")
    } else {
        anyhow::anyhow!("unit panicked")
    }
}
