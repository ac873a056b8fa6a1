/*!
 * Execution Manager
 * Divides the per-update tick budget across the four priority tiers
 */

use crate::core::clock::{MonotonicClock, TickSource};
use crate::core::config::KernelConfig;
use crate::core::types::{ExecId, Priority, Ticks};
use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub mod executable;
mod queue;
mod record;
mod stats;
mod tier;

pub use executable::{ExecStatus, Executable};
pub use stats::KernelStats;
pub use tier::ForceRun;

use record::{ExecRecord, Registry};
use stats::AtomicKernelStats;
use tier::TierExecutor;

/// Top-level coordinator: owns one tier executor per priority, assigns
/// identifiers, and partitions each update's tick budget across the tiers in
/// strict priority order.
///
/// Explicitly constructed and passed to whoever creates processes; there is
/// no global instance. All entry points take `&self` and mutate shared state
/// behind short-lived locks, but the scheduler is cooperative: the design
/// assumes the host serializes calls into it.
pub struct ExecutionManager {
    config: KernelConfig,
    clock: Arc<dyn TickSource>,
    registry: Arc<Registry>,
    tiers: [TierExecutor; 4],
    next_id: AtomicU64,
    stats: Arc<AtomicKernelStats>,
}

/// Builder for [`ExecutionManager`].
pub struct ExecutionManagerBuilder {
    config: KernelConfig,
    clock: Option<Arc<dyn TickSource>>,
}

impl ExecutionManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: KernelConfig::default(),
            clock: None,
        }
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Substitute the tick source; tests inject a manually advanced clock.
    pub fn with_clock(mut self, clock: Arc<dyn TickSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> ExecutionManager {
        let config = self.config;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new(config.ticks_per_micro)));
        let registry = Arc::new(Registry::default());
        let stats = Arc::new(AtomicKernelStats::default());

        let tier = |priority: Priority, force: Option<ForceRun>| {
            TierExecutor::new(
                priority,
                force,
                Arc::clone(&registry),
                Arc::clone(&clock),
                Arc::clone(&stats),
            )
        };
        let tiers = [
            tier(Priority::Realtime, None),
            tier(
                Priority::OneShot,
                Some(ForceRun {
                    max_skips: config.oneshot_max_skips,
                    force_ticks: config.oneshot_force_ticks,
                }),
            ),
            tier(
                Priority::Idle,
                Some(ForceRun {
                    max_skips: config.idle_max_skips,
                    force_ticks: config.idle_force_ticks,
                }),
            ),
            tier(Priority::Normal, None),
        ];

        info!(
            "Execution manager initialized: budget {} ticks/update",
            config.budget_ticks()
        );

        ExecutionManager {
            config,
            clock,
            registry,
            tiers,
            next_id: AtomicU64::new(1),
            stats,
        }
    }
}

impl Default for ExecutionManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionManager {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ExecutionManagerBuilder {
        ExecutionManagerBuilder::new()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Register an executable under a priority tier. Never blocks; the unit
    /// lands at the tail of the tier's waiting queue and is considered on
    /// the next update.
    pub fn register(
        &self,
        priority: Priority,
        unit: Box<dyn Executable>,
        name: impl Into<String>,
    ) -> ExecId {
        let id = self.allocate_id();
        self.register_allocated(id, priority, unit, name.into());
        id
    }

    /// Reserve the next identifier without registering anything yet. Used by
    /// the process layer, which needs the id before it builds the thread.
    pub(crate) fn allocate_id(&self) -> ExecId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn register_allocated(
        &self,
        id: ExecId,
        priority: Priority,
        unit: Box<dyn Executable>,
        name: String,
    ) {
        info!("Registered {priority} unit {id} ({name})");
        self.registry.insert(id, priority);
        self.tiers[priority.index()].enqueue(ExecRecord { id, name, unit });
        self.stats.inc_registered();
    }

    /// Kill the unit with this id: notify it of termination, drop it from
    /// its tier's queues, and remove the registry entry. Idempotent; killing
    /// an unknown id is a no-op. A unit killed mid-update is guaranteed to
    /// never receive another advance.
    pub fn kill(&self, id: ExecId) {
        let Some(priority) = self.registry.remove(id) else {
            return;
        };
        self.stats.inc_killed();
        self.tiers[priority.index()].kill(id);
    }

    /// Kill everything still registered. Explicit end-of-life for the
    /// scheduler instance; the host calls this on scene teardown.
    pub fn shutdown(&self) {
        let ids = self.registry.ids();
        debug!("Execution manager shutting down, killing {} units", ids.len());
        for id in ids {
            self.kill(id);
        }
    }

    /// Number of schedulable units across all tiers.
    pub fn count(&self) -> usize {
        self.tiers.iter().map(TierExecutor::len).sum()
    }

    pub fn stats(&self) -> KernelStats {
        self.stats.snapshot(self.count())
    }

    /// Run one host-loop update within `budget` ticks.
    ///
    /// Tiers are invoked in priority order with a subtractive,
    /// cascading-remainder allocation: each fractional limit reserves budget
    /// for the tiers that come after, and each tier's allowance is computed
    /// from what actually remains after the tiers before it ran. Every tier
    /// is invoked even when its allowance is non-positive, because its
    /// force-run policy may still grant minimal progress.
    ///
    /// Unit faults never escape this call.
    pub fn execute(&self, budget: Ticks) {
        let start = self.clock.now();

        let realtime = budget - (budget as f64 * self.config.realtime_fraction) as Ticks;
        self.tiers[Priority::Realtime.index()].execute(realtime);

        let remaining = budget - (self.clock.now() - start);
        let oneshot = remaining - (budget as f64 * self.config.oneshot_fraction) as Ticks;
        self.tiers[Priority::OneShot.index()].execute(oneshot);

        let remaining = budget - (self.clock.now() - start);
        let idle = remaining - (budget as f64 * self.config.idle_fraction) as Ticks;
        self.tiers[Priority::Idle.index()].execute(idle);

        let normal = budget - (self.clock.now() - start);
        self.tiers[Priority::Normal.index()].execute(normal);
    }

    /// Host-loop entry point for one fixed-rate tick: converts the configured
    /// update time into ticks and runs [`ExecutionManager::execute`].
    pub fn fixed_update(&self) {
        self.execute(self.config.budget_ticks());
    }
}

impl Default for ExecutionManager {
    fn default() -> Self {
        Self::new()
    }
}
