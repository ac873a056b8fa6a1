/*!
 * Shutdown Hooks
 * Explicitly disposed subscriptions to a process's shutdown event
 */

use crate::process::process::Process;
use std::sync::Weak;

/// Handle returned by [`Process::on_shutdown`].
///
/// Holds only a weak reference to the process, so a subscription never
/// extends the lifetime of either side. Dropping or [`dispose`]-ing the hook
/// detaches the callback; detaching after the process has terminated (or has
/// already invoked the callback) is a no-op. There is no finalizer magic:
/// collaborators are expected to dispose their hook in their own teardown.
///
/// [`dispose`]: ShutdownHook::dispose
#[must_use = "dropping the hook immediately detaches the shutdown callback"]
pub struct ShutdownHook {
    process: Weak<Process>,
    key: Option<u64>,
}

impl ShutdownHook {
    pub(crate) fn new(process: Weak<Process>, key: u64) -> Self {
        Self {
            process,
            key: Some(key),
        }
    }

    /// Detach the callback from the process's shutdown event.
    pub fn dispose(mut self) {
        self.detach();
    }

    /// Whether the callback is still registered and can still fire.
    pub fn is_attached(&self) -> bool {
        match self.key {
            Some(key) => self
                .process
                .upgrade()
                .is_some_and(|process| process.has_shutdown_subscriber(key)),
            None => false,
        }
    }

    fn detach(&mut self) {
        if let Some(key) = self.key.take() {
            if let Some(process) = self.process.upgrade() {
                process.detach_shutdown(key);
            }
        }
    }
}

impl Drop for ShutdownHook {
    fn drop(&mut self) {
        self.detach();
    }
}
