/*!
 * Execution Records
 * Registry entries mapping identifiers to their priority tier
 */

use crate::core::types::{ExecId, Priority};
use crate::exec::executable::Executable;
use dashmap::DashMap;

/// One registered unit, owned by its tier's queues while schedulable and by
/// the executor's stack while being advanced.
pub(crate) struct ExecRecord {
    pub id: ExecId,
    pub name: String,
    pub unit: Box<dyn Executable>,
}

/// Identifier registry: the source of truth for which units are still alive.
///
/// A record whose id is absent here must never be advanced again; the tier
/// executor checks liveness on every dequeue and requeue, which is what makes
/// kill effective even against a record that is in flight.
#[derive(Default)]
pub(crate) struct Registry {
    entries: DashMap<ExecId, Priority>,
}

impl Registry {
    pub fn insert(&self, id: ExecId, priority: Priority) {
        self.entries.insert(id, priority);
    }

    /// Registry-only removal, used when a unit finishes normally. Removing an
    /// unknown id is a no-op.
    pub fn remove(&self, id: ExecId) -> Option<Priority> {
        self.entries.remove(&id).map(|(_, priority)| priority)
    }

    pub fn contains(&self, id: ExecId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<ExecId> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }
}
