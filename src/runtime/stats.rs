//! Loop statistics.
//!
//! Each worker counts on its own stack and deposits into a per-worker
//! sink at loop exit; the executor merges the slots and reports the totals
//! under the loop name.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::concurrency::PerWorker;

/// Counters for one worker's share of a loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoopStats {
    /// Operator invocations, aborted ones included.
    pub iterations: u64,
    /// Iterations rolled back on a conflict.
    pub conflicts: u64,
    /// Work items pushed by committed iterations.
    pub pushes: u64,
}

/// Totals for a finished loop, returned by the executor.
#[derive(Clone, Copy, Debug)]
pub struct LoopSummary {
    /// Operator invocations, aborted ones included.
    pub iterations: u64,
    /// Successfully committed iterations.
    pub commits: u64,
    /// Iterations rolled back on a conflict.
    pub conflicts: u64,
    /// Work items pushed by committed iterations.
    pub pushes: u64,
    /// Wall-clock duration of the loop call.
    pub duration: Duration,
    /// True if the loop stopped on a committed break.
    pub broke: bool,
}

#[derive(Default)]
struct StatSlot {
    iterations: AtomicU64,
    conflicts: AtomicU64,
    pushes: AtomicU64,
    init_nanos: AtomicU64,
    exec_nanos: AtomicU64,
}

/// Per-worker deposit target, merged by the executor after the pool run.
pub(crate) struct StatSink {
    slots: PerWorker<StatSlot>,
}

impl StatSink {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            slots: PerWorker::new(workers, |_| StatSlot::default()),
        }
    }

    pub(crate) fn deposit(&self, stats: LoopStats, init: Duration, exec: Duration) {
        let slot = self.slots.local();
        slot.iterations.store(stats.iterations, Ordering::Relaxed);
        slot.conflicts.store(stats.conflicts, Ordering::Relaxed);
        slot.pushes.store(stats.pushes, Ordering::Relaxed);
        slot.init_nanos.store(init.as_nanos() as u64, Ordering::Relaxed);
        slot.exec_nanos.store(exec.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn totals(&self) -> LoopStats {
        let mut total = LoopStats::default();
        for slot in self.slots.iter() {
            total.iterations += slot.iterations.load(Ordering::Relaxed);
            total.conflicts += slot.conflicts.load(Ordering::Relaxed);
            total.pushes += slot.pushes.load(Ordering::Relaxed);
        }
        total
    }

    /// Per-worker phase timers, logged when `more_stats` is on.
    pub(crate) fn log_phase_timers(&self, loopname: &str) {
        for (w, slot) in self.slots.iter().enumerate() {
            tracing::debug!(
                loopname,
                worker = w,
                init_us = slot.init_nanos.load(Ordering::Relaxed) / 1_000,
                exec_us = slot.exec_nanos.load(Ordering::Relaxed) / 1_000,
                "loop phase timers"
            );
        }
    }
}
