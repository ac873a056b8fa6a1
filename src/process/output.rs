/*!
 * Output Sinks
 * Where processes deliver script output and error text
 */

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Destination for script output. The scheduler only ever appends text to a
/// sink; it never parses or interprets the content.
pub trait OutputSink: Send + Sync {
    fn add_output(&self, text: &str);
    fn add_error(&self, text: &str);
}

/// One captured line of output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OutputLine {
    pub text: String,
    pub error: bool,
}

/// Bounded in-memory sink for REPL-style consumers. When the line capacity
/// is exceeded the oldest lines are dropped first.
pub struct OutputBuffer {
    capacity: usize,
    lines: Mutex<VecDeque<OutputLine>>,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: Mutex::new(VecDeque::new()),
        }
    }

    pub fn lines(&self) -> Vec<OutputLine> {
        self.lines.lock().iter().cloned().collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|line| line.error)
            .map(|line| line.text.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    fn push(&self, text: &str, error: bool) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(OutputLine {
            text: text.to_owned(),
            error,
        });
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl OutputSink for OutputBuffer {
    fn add_output(&self, text: &str) {
        self.push(text, false);
    }

    fn add_error(&self, text: &str) {
        self.push(text, true);
    }
}
