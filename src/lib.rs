/*!
 * Tick Kernel
 * Priority-tiered, budget-bounded cooperative scheduler for scripted
 * workloads inside a fixed-rate host loop
 *
 * The kernel divides a hard per-update tick budget among four priority
 * tiers, advances independently resumable units within that budget, and
 * guarantees that runaway or faulting units cannot stall the host loop.
 * Processes group threads that share lifecycle and shutdown semantics.
 */

pub mod core;
pub mod exec;
pub mod process;

// Re-exports
pub use crate::core::{
    ExecId, KernelConfig, ManualClock, MonotonicClock, Priority, ProcessError, ProcessId,
    ProcessResult, TickSource, Ticks,
};
pub use exec::{ExecStatus, Executable, ExecutionManager, ForceRun, KernelStats};
pub use process::{
    HandlerId, OutputBuffer, OutputLine, OutputSink, Process, ShutdownHook, Thread,
    ThreadHandle, ThreadOptions,
};
