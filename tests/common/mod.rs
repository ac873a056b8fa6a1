/*!
 * Test Support
 * Deterministic executables driven by a manually advanced tick source
 */
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tick_kernel::{
    ExecId, ExecStatus, Executable, ExecutionManager, ManualClock, TickSource, Ticks,
};

/// Observable side effects of one test unit.
#[derive(Default)]
pub struct Probe {
    pub calls: AtomicU64,
    pub ticks: AtomicI64,
    pub finished: AtomicBool,
    pub terminated: AtomicU64,
    pub faulted: AtomicU64,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn ticks(&self) -> Ticks {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn terminated(&self) -> u64 {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn faulted(&self) -> u64 {
        self.faulted.load(Ordering::SeqCst)
    }
}

enum Behavior {
    /// Consume up to the remaining need, then finish.
    Work(Ticks),
    /// Consume every grant and always ask for more.
    Spin,
    /// Fail on the first advance.
    Fault(&'static str),
    /// Panic on the first advance.
    Panic(&'static str),
}

/// Scripted executable for scheduler tests.
///
/// Every advance consumes at least one tick from the shared [`ManualClock`],
/// modelling the real overhead of entering a unit, so budget arithmetic in
/// the tier loop stays deterministic and terminating.
pub struct TestUnit {
    clock: Arc<ManualClock>,
    probe: Arc<Probe>,
    behavior: Behavior,
    yields_left: u32,
    sleeping: Option<Arc<AtomicBool>>,
    on_execute: Option<Box<dyn FnMut() + Send>>,
}

impl TestUnit {
    pub fn work(clock: &Arc<ManualClock>, probe: &Arc<Probe>, need: Ticks) -> Self {
        Self::new(clock, probe, Behavior::Work(need))
    }

    pub fn spin(clock: &Arc<ManualClock>, probe: &Arc<Probe>) -> Self {
        Self::new(clock, probe, Behavior::Spin)
    }

    pub fn fault(clock: &Arc<ManualClock>, probe: &Arc<Probe>, message: &'static str) -> Self {
        Self::new(clock, probe, Behavior::Fault(message))
    }

    pub fn panicker(clock: &Arc<ManualClock>, probe: &Arc<Probe>, message: &'static str) -> Self {
        Self::new(clock, probe, Behavior::Panic(message))
    }

    fn new(clock: &Arc<ManualClock>, probe: &Arc<Probe>, behavior: Behavior) -> Self {
        Self {
            clock: Arc::clone(clock),
            probe: Arc::clone(probe),
            behavior,
            yields_left: 0,
            sleeping: None,
            on_execute: None,
        }
    }

    /// Yield voluntarily this many times before doing any work.
    #[must_use]
    pub fn with_yields(mut self, yields: u32) -> Self {
        self.yields_left = yields;
        self
    }

    /// Report sleeping while the flag is set.
    #[must_use]
    pub fn with_sleep_flag(mut self, flag: &Arc<AtomicBool>) -> Self {
        self.sleeping = Some(Arc::clone(flag));
        self
    }

    /// Run a side effect at the start of every advance (e.g. reentrant
    /// kills through the manager).
    #[must_use]
    pub fn with_hook(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_execute = Some(Box::new(hook));
        self
    }

    pub fn boxed(self) -> Box<dyn Executable> {
        Box::new(self)
    }

    fn consume(&self, ticks: Ticks) {
        self.clock.advance(ticks);
        self.probe.ticks.fetch_add(ticks, Ordering::SeqCst);
    }
}

impl Executable for TestUnit {
    fn is_sleeping(&self) -> bool {
        self.sleeping
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn execute(&mut self, ticks: Ticks) -> Result<ExecStatus, anyhow::Error> {
        self.probe.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &mut self.on_execute {
            hook();
        }
        if self.yields_left > 0 {
            self.yields_left -= 1;
            self.consume(1);
            return Ok(ExecStatus::Yielded);
        }
        let grant = ticks.max(1);
        match &mut self.behavior {
            Behavior::Work(need) => {
                let used = grant.min(*need);
                *need -= used;
                let remaining = *need;
                self.consume(used);
                if remaining <= 0 {
                    self.probe.finished.store(true, Ordering::SeqCst);
                    Ok(ExecStatus::Finished)
                } else {
                    Ok(ExecStatus::Interrupted)
                }
            }
            Behavior::Spin => {
                self.consume(grant);
                Ok(ExecStatus::Interrupted)
            }
            Behavior::Fault(message) => {
                let message = *message;
                self.consume(1);
                Err(anyhow::anyhow!(message))
            }
            Behavior::Panic(message) => {
                let message = *message;
                self.consume(1);
                panic!("{}", message)
            }
        }
    }

    fn on_terminated(&mut self, _name: &str, _id: ExecId) {
        self.probe.terminated.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exception(&mut self, _name: &str, _id: ExecId, _error: &anyhow::Error) {
        self.probe.faulted.fetch_add(1, Ordering::SeqCst);
    }
}

/// Execution manager wired to a fresh manual clock.
pub fn manual_kernel() -> (Arc<ExecutionManager>, Arc<ManualClock>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(ManualClock::new());
    let kernel = ExecutionManager::builder()
        .with_clock(Arc::clone(&clock) as Arc<dyn TickSource>)
        .build();
    (Arc::new(kernel), clock)
}
