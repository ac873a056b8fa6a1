/*!
 * Core Module
 * Shared types, errors, configuration, and tick sources
 */

pub mod clock;
pub mod config;
pub mod errors;
pub mod types;

pub use clock::{ManualClock, MonotonicClock, TickSource};
pub use config::KernelConfig;
pub use errors::ProcessError;
pub use types::{ExecId, Priority, ProcessId, ProcessResult, Ticks};
