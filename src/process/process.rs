/*!
 * Processes
 * Named owners of threads sharing lifecycle and shutdown semantics
 */

use crate::core::types::{ExecId, Priority, ProcessId, ProcessResult};
use crate::core::ProcessError;
use crate::exec::{Executable, ExecutionManager};
use crate::process::output::OutputSink;
use crate::process::shutdown::ShutdownHook;
use crate::process::thread::{Thread, ThreadHandle, ThreadOptions};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_PROCESS_ID: AtomicU64 = AtomicU64::new(1);

type ThreadDoneHandler = Box<dyn Fn(&Arc<ThreadHandle>) + Send>;
type UpdateHandler = Box<dyn FnMut() -> Result<(), anyhow::Error> + Send>;
type ShutdownCallback = Box<dyn FnOnce() + Send>;

/// Identifier of a registered update handler, used to unsubscribe.
pub type HandlerId = u64;

struct Threads {
    by_id: HashMap<ExecId, Arc<ThreadHandle>>,
    foreground: usize,
    background: usize,
}

impl Threads {
    fn assert_counts(&self) {
        debug_assert_eq!(self.by_id.len(), self.foreground + self.background);
    }
}

/// A named, identified owner of a set of threads.
///
/// Tracks foreground and background thread counts and, unless opted out via
/// [`set_auto_remove`], terminates itself once no foreground thread remains
/// while background threads are still running ("terminate all background
/// threads if there is no foreground left").
///
/// [`set_auto_remove`]: Process::set_auto_remove
pub struct Process {
    id: ProcessId,
    name: String,
    kernel: Arc<ExecutionManager>,
    auto_remove: AtomicBool,
    terminated: AtomicBool,
    threads: Mutex<Threads>,
    thread_done: Mutex<Vec<ThreadDoneHandler>>,
    physics: Mutex<Vec<(HandlerId, UpdateHandler)>>,
    graphics: Mutex<Vec<(HandlerId, UpdateHandler)>>,
    shutdown: Mutex<HashMap<u64, ShutdownCallback>>,
    next_handler_id: AtomicU64,
    output: Mutex<Option<Arc<dyn OutputSink>>>,
}

impl Process {
    pub fn new(kernel: Arc<ExecutionManager>, name: impl Into<String>) -> Arc<Self> {
        let id = NEXT_PROCESS_ID.fetch_add(1, Ordering::SeqCst);
        let mut name = name.into();
        if name.is_empty() {
            name = format!("process#{id}");
        }
        info!("Process#{id} ({name}) created");
        Arc::new(Self {
            id,
            name,
            kernel,
            auto_remove: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
            threads: Mutex::new(Threads {
                by_id: HashMap::new(),
                foreground: 0,
                background: 0,
            }),
            thread_done: Mutex::new(Vec::new()),
            physics: Mutex::new(Vec::new()),
            graphics: Mutex::new(Vec::new()),
            shutdown: Mutex::new(HashMap::new()),
            next_handler_id: AtomicU64::new(1),
            output: Mutex::new(None),
        })
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kernel(&self) -> &Arc<ExecutionManager> {
        &self.kernel
    }

    pub fn auto_remove(&self) -> bool {
        self.auto_remove.load(Ordering::SeqCst)
    }

    /// Disable to reuse the process after its foreground threads exit; the
    /// caller then owns termination.
    pub fn set_auto_remove(&self, auto_remove: bool) {
        self.auto_remove.store(auto_remove, Ordering::SeqCst);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().by_id.len()
    }

    pub fn foreground_count(&self) -> usize {
        self.threads.lock().foreground
    }

    pub fn background_count(&self) -> usize {
        self.threads.lock().background
    }

    /// Optional destination for script output; used if assigned.
    pub fn set_output(&self, sink: Option<Arc<dyn OutputSink>>) {
        *self.output.lock() = sink;
    }

    pub fn output(&self) -> Option<Arc<dyn OutputSink>> {
        self.output.lock().clone()
    }

    /// Create a thread around `unit`, add it to this process, and register
    /// it with the execution manager under `priority`.
    pub fn launch(
        self: &Arc<Self>,
        priority: Priority,
        unit: Box<dyn Executable>,
        options: ThreadOptions,
    ) -> ProcessResult<Arc<ThreadHandle>> {
        let id = self.kernel.allocate_id();
        let name = if options.name.is_empty() {
            format!("{}/{id}", self.name)
        } else {
            options.name.clone()
        };
        let handle = Arc::new(ThreadHandle::new(id, name.clone(), &options));
        self.add(&handle)?;
        let thread = Thread::new(Arc::clone(&handle), Arc::downgrade(self), unit);
        self.kernel
            .register_allocated(id, priority, Box::new(thread), name);
        Ok(handle)
    }

    /// Take ownership of a thread. Fails if the thread already belongs to
    /// any process, or if this process is already terminated.
    pub fn add(self: &Arc<Self>, handle: &Arc<ThreadHandle>) -> ProcessResult<()> {
        if self.is_terminated() {
            return Err(ProcessError::Terminated(self.id));
        }
        if let Err(current) = handle.claim(self) {
            return Err(ProcessError::DuplicateOwnership {
                thread: handle.id(),
                process: current.id(),
            });
        }
        debug!("Adding thread#{} into process#{}", handle.id(), self.id);
        let mut threads = self.threads.lock();
        threads.by_id.insert(handle.id(), Arc::clone(handle));
        if handle.is_background() {
            threads.background += 1;
        } else {
            threads.foreground += 1;
        }
        threads.assert_counts();
        Ok(())
    }

    /// Release ownership of a thread. Fails unless this process is the
    /// current owner.
    pub fn remove(&self, handle: &Arc<ThreadHandle>) -> ProcessResult<()> {
        let owned_here = handle
            .owner()
            .is_some_and(|owner| owner.id == self.id);
        if !owned_here {
            return Err(ProcessError::NotOwned {
                thread: handle.id(),
                process: self.id,
            });
        }
        debug!("Removing thread#{} from process#{}", handle.id(), self.id);
        handle.clear_owner();
        let should_terminate = {
            let mut threads = self.threads.lock();
            if threads.by_id.remove(&handle.id()).is_some() {
                if handle.is_background() {
                    threads.background -= 1;
                } else {
                    threads.foreground -= 1;
                }
            }
            threads.assert_counts();
            self.termination_due(&threads)
        };
        if should_terminate {
            self.terminate(false);
        }
        Ok(())
    }

    /// Rebalance counters after a thread flipped its background flag.
    pub(crate) fn on_background_change(&self, handle: &ThreadHandle) {
        let should_terminate = {
            let mut threads = self.threads.lock();
            if handle.is_background() {
                threads.foreground -= 1;
                threads.background += 1;
            } else {
                threads.background -= 1;
                threads.foreground += 1;
            }
            threads.assert_counts();
            self.termination_due(&threads)
        };
        if should_terminate {
            self.terminate(false);
        }
    }

    /// Auto-termination rule: once no foreground thread remains while
    /// threads (necessarily background) are still present, the process goes
    /// down and takes them with it. Only when `auto_remove` is set.
    fn termination_due(&self, threads: &Threads) -> bool {
        self.auto_remove()
            && !self.is_terminated()
            && threads.foreground == 0
            && !threads.by_id.is_empty()
    }

    /// Called by a thread when it is really done executing (finished,
    /// terminated, or faulted).
    pub(crate) fn on_thread_done(&self, handle: &Arc<ThreadHandle>) {
        let handlers = mem::take(&mut *self.thread_done.lock());
        for handler in &handlers {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(handle))).is_err() {
                warn!("thread_done handler panicked in process#{}", self.id);
            }
        }
        let mut guard = self.thread_done.lock();
        let added = mem::replace(&mut *guard, handlers);
        guard.extend(added);
        drop(guard);

        if handle.auto_remove() {
            // Already-detached handles are fine here; termination cascades
            // sever ownership before the kill loop runs.
            let _ = self.remove(handle);
        }
    }

    /// Subscribe to thread completion.
    pub fn subscribe_thread_done(
        &self,
        handler: impl Fn(&Arc<ThreadHandle>) + Send + 'static,
    ) {
        self.thread_done.lock().push(Box::new(handler));
    }

    /// Subscribe a handler to the physics update broadcast.
    pub fn subscribe_physics(
        &self,
        handler: impl FnMut() -> Result<(), anyhow::Error> + Send + 'static,
    ) -> HandlerId {
        let id = self.next_handler_id.fetch_add(1, Ordering::SeqCst);
        self.physics.lock().push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe_physics(&self, id: HandlerId) {
        self.physics.lock().retain(|(hid, _)| *hid != id);
    }

    /// Subscribe a handler to the graphics update broadcast.
    pub fn subscribe_graphics(
        &self,
        handler: impl FnMut() -> Result<(), anyhow::Error> + Send + 'static,
    ) -> HandlerId {
        let id = self.next_handler_id.fetch_add(1, Ordering::SeqCst);
        self.graphics.lock().push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe_graphics(&self, id: HandlerId) {
        self.graphics.lock().retain(|(hid, _)| *hid != id);
    }

    /// To be called on every physics update of the host loop.
    pub fn fixed_update(&self) {
        self.broadcast(&self.physics, "physics");
    }

    /// To be called on every graphics update of the host loop.
    pub fn update(&self) {
        self.broadcast(&self.graphics, "graphics");
    }

    /// Invoke every registered handler; a handler that errors or panics is
    /// unsubscribed and reported, and the remaining handlers still run.
    fn broadcast(&self, handlers: &Mutex<Vec<(HandlerId, UpdateHandler)>>, what: &str) {
        let mut list = mem::take(&mut *handlers.lock());
        list.retain_mut(|(_, handler)| {
            match panic::catch_unwind(AssertUnwindSafe(|| handler())) {
                Ok(Ok(())) => true,
                Ok(Err(error)) => {
                    warn!(
                        "Error in process#{} {what} update handler: {error:#}",
                        self.id
                    );
                    false
                }
                Err(_) => {
                    warn!("Panic in process#{} {what} update handler", self.id);
                    false
                }
            }
        });
        // Handlers subscribed during the broadcast land behind the survivors.
        let mut guard = handlers.lock();
        let added = mem::replace(&mut *guard, list);
        guard.extend(added);
    }

    /// Subscribe to process teardown. The callback fires at most once, when
    /// the process terminates; disposing the returned hook detaches it.
    pub fn on_shutdown(
        self: &Arc<Self>,
        callback: impl FnOnce() + Send + 'static,
    ) -> ShutdownHook {
        let key = self.next_handler_id.fetch_add(1, Ordering::SeqCst);
        self.shutdown.lock().insert(key, Box::new(callback));
        ShutdownHook::new(Arc::downgrade(self), key)
    }

    pub(crate) fn detach_shutdown(&self, key: u64) {
        self.shutdown.lock().remove(&key);
    }

    pub(crate) fn has_shutdown_subscriber(&self, key: u64) -> bool {
        self.shutdown.lock().contains_key(&key)
    }

    /// Terminate the process: notify every shutdown subscriber, then
    /// terminate every owned thread. Idempotent; a second call is a no-op.
    ///
    /// `hard` is forwarded for API symmetry with hosts that distinguish
    /// immediate from graceful teardown; thread termination is always
    /// immediate here.
    pub fn terminate(&self, hard: bool) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        // Subscribers run first, before their world is torn down.
        let subscribers: Vec<ShutdownCallback> = {
            let mut shutdown = self.shutdown.lock();
            shutdown.drain().map(|(_, callback)| callback).collect()
        };
        debug!(
            "Process#{} terminating (hard: {hard}, shutdown subscribers: {})",
            self.id,
            subscribers.len()
        );
        for callback in subscribers {
            if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
                warn!("Panic in process#{} shutdown subscriber", self.id);
            }
        }

        // Sever ownership before the kill loop so termination notices do not
        // re-enter the thread table.
        let handles: Vec<Arc<ThreadHandle>> = {
            let mut threads = self.threads.lock();
            threads.foreground = 0;
            threads.background = 0;
            threads.by_id.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &handles {
            handle.clear_owner();
        }
        for handle in &handles {
            self.kernel.kill(handle.id());
        }

        info!("Process#{} ({}) terminated", self.id, self.name);
    }

    /// Route a thread fault to the output sink, if one is assigned.
    pub(crate) fn report_thread_error(
        &self,
        name: &str,
        id: ExecId,
        error: &anyhow::Error,
    ) {
        warn!("Process#{}: thread {id} ({name}) faulted: {error:#}", self.id);
        let output = self.output();
        if let Some(sink) = output {
            sink.add_error(&format!("{name}: {error:#}"));
        }
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        // Last-resort cleanup for processes abandoned without termination.
        if !self.is_terminated() {
            let threads = self.threads.lock();
            for id in threads.by_id.keys() {
                self.kernel.kill(*id);
            }
        }
    }
}
