/*!
 * Kernel Configuration
 * Tunable budget fractions, force-run constants, and the tick conversion factor
 */

use crate::core::types::Ticks;
use serde::{Deserialize, Serialize};

/// Scheduling parameters for one [`crate::exec::ExecutionManager`].
///
/// The fractional limits are reservation floors for the tiers that come
/// *after* the tier named, not ceilings for the tier itself: Realtime only
/// runs while more than `realtime_fraction` of the budget remains for the
/// rest, OneShot stops once `oneshot_fraction` remains, Idle stops once
/// `idle_fraction` remains. The subtractive, cascading-remainder computation
/// in `ExecutionManager::execute` depends on this reading; replacing it with
/// fixed quotas changes fairness under load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct KernelConfig {
    /// Host-loop budget per fixed update, in microseconds.
    pub update_micros: f64,
    /// Fixed conversion factor between microseconds and scheduler ticks.
    pub ticks_per_micro: f64,
    /// Fraction of the budget reserved for tiers after Realtime.
    pub realtime_fraction: f64,
    /// Fraction of the budget reserved for tiers after OneShot.
    pub oneshot_fraction: f64,
    /// Fraction of the budget reserved for the Normal tier after Idle.
    pub idle_fraction: f64,
    /// Budget granted to a forced OneShot run.
    pub oneshot_force_ticks: Ticks,
    /// Budget granted to a forced Idle run.
    pub idle_force_ticks: Ticks,
    /// Zero-allowance updates OneShot tolerates before a forced run.
    pub oneshot_max_skips: u32,
    /// Zero-allowance updates Idle tolerates before a forced run.
    pub idle_max_skips: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            update_micros: 2000.0,
            ticks_per_micro: 1.0,
            realtime_fraction: 0.5,
            oneshot_fraction: 0.4,
            idle_fraction: 0.6,
            oneshot_force_ticks: 100,
            idle_force_ticks: 100,
            oneshot_max_skips: 1,
            idle_max_skips: 9,
        }
    }
}

impl KernelConfig {
    /// Tick budget of one fixed update.
    pub fn budget_ticks(&self) -> Ticks {
        (self.update_micros * self.ticks_per_micro) as Ticks
    }

    #[must_use]
    pub fn with_update_micros(mut self, micros: f64) -> Self {
        self.update_micros = micros;
        self
    }

    #[must_use]
    pub fn with_fractions(mut self, realtime: f64, oneshot: f64, idle: f64) -> Self {
        self.realtime_fraction = realtime;
        self.oneshot_fraction = oneshot;
        self.idle_fraction = idle;
        self
    }
}
