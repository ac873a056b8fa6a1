/*!
 * Process Module
 * Thread ownership, lifecycle cascades, and teardown notification
 */

mod output;
#[allow(clippy::module_inception)]
mod process;
mod shutdown;
mod thread;

pub use output::{OutputBuffer, OutputLine, OutputSink};
pub use process::{HandlerId, Process};
pub use shutdown::ShutdownHook;
pub use thread::{Thread, ThreadHandle, ThreadOptions};
