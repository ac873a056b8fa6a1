/*!
 * Executable Capability
 * The resumable-work contract every scheduled unit exposes
 */

use crate::core::types::{ExecId, Ticks};
use serde::{Deserialize, Serialize};

/// Outcome of advancing an executable by one time slice.
///
/// Closed set: the tier loop matches it exhaustively with no default arm, so
/// a new status is a compile-time-checked addition rather than a runtime
/// fallthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    /// Ran to completion; the unit leaves scheduling permanently.
    Finished,
    /// Voluntarily gave up the rest of this update; waits for the next tick.
    Yielded,
    /// Exhausted its slice while still wanting more; may run again this tick
    /// if other units finish or yield early.
    Interrupted,
}

/// The resumable-work capability the kernel schedules.
///
/// Implementors are script coroutines, VM fibers, or [`crate::process::Thread`]
/// wrappers. The kernel never looks inside a unit; it only advances it in
/// bounded tick increments and reacts to the reported status.
pub trait Executable: Send {
    /// Sleeping units stay in the waiting queue and are not promoted.
    fn is_sleeping(&self) -> bool {
        false
    }

    /// Advance by up to `ticks` and report how the slice ended.
    ///
    /// Returning `Err` is a unit fault: the kernel drops the unit from
    /// scheduling and delivers the error through
    /// [`Executable::on_exception`]. Sibling units are unaffected.
    fn execute(&mut self, ticks: Ticks) -> Result<ExecStatus, anyhow::Error>;

    /// Involuntary termination notice: an explicit kill or a cascading
    /// process shutdown. Not called for normal completion.
    fn on_terminated(&mut self, _name: &str, _id: ExecId) {}

    /// Fault notice, delivered after the unit has been dropped from
    /// scheduling. Units that want graceful recovery should catch their own
    /// errors inside `execute` instead.
    fn on_exception(&mut self, _name: &str, _id: ExecId, _error: &anyhow::Error) {}
}
