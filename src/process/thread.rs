/*!
 * Threads
 * The schedulable wrapper that ties one resumable unit to its owning process
 */

use crate::core::types::{ExecId, Ticks};
use crate::exec::{ExecStatus, Executable};
use crate::process::process::Process;
use log::debug;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Creation options for a thread.
#[derive(Debug, Clone)]
pub struct ThreadOptions {
    /// Explicit name; empty means derive one from the process name and id.
    pub name: String,
    /// Background threads do not keep their process alive.
    pub background: bool,
    /// Remove the thread from its process automatically once it is done.
    pub auto_remove: bool,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            background: false,
            auto_remove: true,
        }
    }
}

impl ThreadOptions {
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }

    #[must_use]
    pub fn keep_when_done(mut self) -> Self {
        self.auto_remove = false;
        self
    }
}

/// Shared identity of one thread: its id, flags, and owner back-reference.
///
/// The [`Thread`] itself is owned by the execution manager's queues while
/// scheduled; the handle is what the process layer and callers hold on to.
#[derive(Debug)]
pub struct ThreadHandle {
    id: ExecId,
    name: String,
    background: AtomicBool,
    auto_remove: AtomicBool,
    owner: Mutex<Weak<Process>>,
}

impl ThreadHandle {
    pub(crate) fn new(id: ExecId, name: String, options: &ThreadOptions) -> Self {
        Self {
            id,
            name,
            background: AtomicBool::new(options.background),
            auto_remove: AtomicBool::new(options.auto_remove),
            owner: Mutex::new(Weak::new()),
        }
    }

    pub fn id(&self) -> ExecId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_background(&self) -> bool {
        self.background.load(Ordering::SeqCst)
    }

    /// Flip the foreground/background flag. The owning process re-balances
    /// its counters and re-evaluates auto-termination.
    pub fn set_background(&self, background: bool) {
        let previous = self.background.swap(background, Ordering::SeqCst);
        if previous != background {
            let owner = self.owner.lock().upgrade();
            if let Some(process) = owner {
                process.on_background_change(self);
            }
        }
    }

    pub fn auto_remove(&self) -> bool {
        self.auto_remove.load(Ordering::SeqCst)
    }

    pub fn set_auto_remove(&self, auto_remove: bool) {
        self.auto_remove.store(auto_remove, Ordering::SeqCst);
    }

    /// The owning process, if any.
    pub fn owner(&self) -> Option<Arc<Process>> {
        self.owner.lock().upgrade()
    }

    /// Claim ownership for `process`; fails when any owner is already set.
    pub(crate) fn claim(&self, process: &Arc<Process>) -> Result<(), Arc<Process>> {
        let mut owner = self.owner.lock();
        if let Some(current) = owner.upgrade() {
            return Err(current);
        }
        *owner = Arc::downgrade(process);
        Ok(())
    }

    pub(crate) fn clear_owner(&self) {
        *self.owner.lock() = Weak::new();
    }
}

/// The executable registered with the execution manager: advances the
/// wrapped resumable unit and keeps the owning process's bookkeeping in sync
/// with the unit's lifecycle.
pub struct Thread {
    handle: Arc<ThreadHandle>,
    process: Weak<Process>,
    unit: Box<dyn Executable>,
    done: bool,
}

impl Thread {
    pub fn new(
        handle: Arc<ThreadHandle>,
        process: Weak<Process>,
        unit: Box<dyn Executable>,
    ) -> Self {
        Self {
            handle,
            process,
            unit,
            done: false,
        }
    }

    pub fn handle(&self) -> &Arc<ThreadHandle> {
        &self.handle
    }

    /// Notify the owning process exactly once that this thread is really
    /// done (finished, terminated, or faulted).
    fn notify_done(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        if let Some(process) = self.process.upgrade() {
            process.on_thread_done(&self.handle);
        }
    }
}

impl Executable for Thread {
    fn is_sleeping(&self) -> bool {
        self.unit.is_sleeping()
    }

    fn execute(&mut self, ticks: Ticks) -> Result<ExecStatus, anyhow::Error> {
        let status = self.unit.execute(ticks)?;
        if status == ExecStatus::Finished {
            debug!("Thread {} ({}) finished", self.handle.id(), self.handle.name());
            self.notify_done();
        }
        Ok(status)
    }

    fn on_terminated(&mut self, name: &str, id: ExecId) {
        self.unit.on_terminated(name, id);
        self.notify_done();
    }

    fn on_exception(&mut self, name: &str, id: ExecId, error: &anyhow::Error) {
        self.unit.on_exception(name, id, error);
        if let Some(process) = self.process.upgrade() {
            process.report_thread_error(name, id, error);
        }
        self.notify_done();
    }
}
