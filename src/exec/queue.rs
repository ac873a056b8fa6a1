/*!
 * Tier Queues
 * Waiting and runnable FIFOs holding the records of one priority tier
 */

use crate::core::types::ExecId;
use crate::exec::record::ExecRecord;
use std::collections::VecDeque;

/// The two scheduling states of one tier.
///
/// `waiting` holds candidates for the next promotion pass; `runnable` holds
/// the units being time-sliced this update. A record lives in exactly one of
/// the two, or on the executor's stack while it is advanced. Order within
/// each queue is insertion order and re-insertion happens at the tail, which
/// is what gives round-robin fairness across ticks.
#[derive(Default)]
pub(crate) struct TierQueue {
    pub waiting: VecDeque<ExecRecord>,
    pub runnable: VecDeque<ExecRecord>,
}

impl TierQueue {
    pub fn len(&self) -> usize {
        self.waiting.len() + self.runnable.len()
    }

    /// Remove the record with this id from whichever queue holds it.
    /// Returns `None` when the record is in flight or already gone.
    pub fn take(&mut self, id: ExecId) -> Option<ExecRecord> {
        if let Some(pos) = self.waiting.iter().position(|r| r.id == id) {
            return self.waiting.remove(pos);
        }
        if let Some(pos) = self.runnable.iter().position(|r| r.id == id) {
            return self.runnable.remove(pos);
        }
        None
    }
}
