/*!
 * Kernel Statistics
 * Lock-free counters for the hot scheduling path
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic kernel statistics for lock-free updates.
///
/// Counters use relaxed ordering; a snapshot may be internally inconsistent
/// under concurrent updates, which is acceptable for monitoring.
#[derive(Default)]
pub(crate) struct AtomicKernelStats {
    registered: AtomicU64,
    finished: AtomicU64,
    killed: AtomicU64,
    faulted: AtomicU64,
    forced_runs: AtomicU64,
    slices: AtomicU64,
}

impl AtomicKernelStats {
    #[inline(always)]
    pub fn inc_registered(&self) {
        self.registered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_finished(&self) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_killed(&self) {
        self.killed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_faulted(&self) {
        self.faulted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_forced_runs(&self) {
        self.forced_runs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_slices(&self) {
        self.slices.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, active: usize) -> KernelStats {
        KernelStats {
            registered: self.registered.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            killed: self.killed.load(Ordering::Relaxed),
            faulted: self.faulted.load(Ordering::Relaxed),
            forced_runs: self.forced_runs.load(Ordering::Relaxed),
            slices: self.slices.load(Ordering::Relaxed),
            active,
        }
    }
}

/// Point-in-time snapshot of kernel activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KernelStats {
    /// Units registered since construction.
    pub registered: u64,
    /// Units that ran to completion.
    pub finished: u64,
    /// Units removed by kill or cascading termination.
    pub killed: u64,
    /// Units dropped after a fault.
    pub faulted: u64,
    /// Forced minimum runs granted to starving tiers.
    pub forced_runs: u64,
    /// Time slices handed out.
    pub slices: u64,
    /// Units currently schedulable across all tiers.
    pub active: usize,
}
