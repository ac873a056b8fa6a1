/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::types::{ExecId, ProcessId};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Process-level ownership and lifecycle errors.
///
/// These are structural violations surfaced synchronously to the caller that
/// committed them. Faults raised while advancing an executable never appear
/// here; they are contained at the tier boundary and delivered through
/// [`crate::exec::Executable::on_exception`].
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ProcessError {
    #[error("Thread {thread} already belongs to process {process}")]
    #[diagnostic(
        code(process::duplicate_ownership),
        help("A thread is owned by at most one process. Remove it from its current owner first.")
    )]
    DuplicateOwnership { thread: ExecId, process: ProcessId },

    #[error("Thread {thread} does not belong to process {process}")]
    #[diagnostic(
        code(process::not_owned),
        help("Only the owning process may remove a thread.")
    )]
    NotOwned { thread: ExecId, process: ProcessId },

    #[error("Process {0} is already terminated")]
    #[diagnostic(
        code(process::terminated),
        help("Terminated processes cannot accept new threads. Create a new process instead.")
    )]
    Terminated(ProcessId),
}
