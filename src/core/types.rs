/*!
 * Core Types
 * Identifiers, the tick currency, and the priority tiers
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one registered executable. Positive, unique, monotonically
/// increasing for the lifetime of an [`crate::exec::ExecutionManager`].
pub type ExecId = u64;

/// Identifier of a process. Positive, unique per host process.
pub type ProcessId = u64;

/// Scheduling currency: a platform-defined high-resolution time unit.
///
/// Signed because a tier's computed allowance can go negative once the tiers
/// before it overrun their share of the update budget.
pub type Ticks = i64;

/// Result type for process-level operations
pub type ProcessResult<T> = Result<T, crate::core::errors::ProcessError>;

/// Priority tier of a registered executable.
///
/// Closed set with strict execution precedence: every update runs Realtime
/// before OneShot before Idle before Normal. Lower tiers are still guaranteed
/// a forced minimum (bounded starvation, not zero starvation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Runs first, up to the realtime reservation cutoff.
    Realtime,
    /// Short-lived work; forced to run after at most one skipped update.
    OneShot,
    /// Housekeeping; tolerates several skipped updates before a forced run.
    Idle,
    /// Main tier; receives whatever budget the others left over.
    Normal,
}

impl Priority {
    /// All tiers in execution order.
    pub const ALL: [Priority; 4] = [
        Priority::Realtime,
        Priority::OneShot,
        Priority::Idle,
        Priority::Normal,
    ];

    /// Dense index for per-tier arrays, in execution order.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Priority::Realtime => 0,
            Priority::OneShot => 1,
            Priority::Idle => 2,
            Priority::Normal => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Realtime => "realtime",
            Priority::OneShot => "oneshot",
            Priority::Idle => "idle",
            Priority::Normal => "normal",
        };
        f.write_str(name)
    }
}
