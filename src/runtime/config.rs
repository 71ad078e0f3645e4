//! Loop configuration.
//!
//! The configuration names the same knobs an operator's trait tuple would:
//! a loop name for statistics, conflict detection, pushes, per-iteration
//! allocation, parallel break, and extra timers. The builder is typed, so
//! unrecognized options cannot be expressed at all.

use thiserror::Error;

use crate::runtime::AbortPolicy;

/// Configuration errors surfaced at construction time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Socket count of zero or exceeding the worker count.
    #[error("bad socket count: {sockets} sockets for {workers} workers")]
    BadSocketCount {
        /// Requested sockets.
        sockets: usize,
        /// Configured workers.
        workers: usize,
    },
}

/// Per-loop execution options.
#[derive(Clone, Debug)]
pub struct LoopConfig {
    pub(crate) loopname: &'static str,
    pub(crate) conflict_detection: bool,
    pub(crate) pushes: bool,
    pub(crate) per_iter_alloc: bool,
    pub(crate) parallel_break: bool,
    pub(crate) more_stats: bool,
    pub(crate) abort_policy: Option<AbortPolicy>,
}

impl LoopConfig {
    /// Defaults: conflict detection on, pushes on, everything else off.
    pub fn new() -> Self {
        Self {
            loopname: "for_each",
            conflict_detection: true,
            pushes: true,
            per_iter_alloc: false,
            parallel_break: false,
            more_stats: false,
            abort_policy: None,
        }
    }

    /// Labels the loop in statistics output.
    pub fn loopname(mut self, name: &'static str) -> Self {
        self.loopname = name;
        self
    }

    /// Skips lock tracking and the abort path entirely; use when the
    /// operator touches no shared state or synchronizes on its own.
    pub fn disable_conflict_detection(mut self) -> Self {
        self.conflict_detection = false;
        self
    }

    /// Declares that the operator never pushes new work, enabling the
    /// pushless drain path.
    pub fn no_pushes(mut self) -> Self {
        self.pushes = false;
        self
    }

    /// Provides a scratch allocator to each iteration.
    pub fn per_iter_alloc(mut self) -> Self {
        self.per_iter_alloc = true;
        self
    }

    /// Allows the operator to stop the loop with
    /// [`UserContext::break_loop`](crate::runtime::UserContext::break_loop).
    pub fn parallel_break(mut self) -> Self {
        self.parallel_break = true;
        self
    }

    /// Records and logs per-worker phase timers.
    pub fn more_stats(mut self) -> Self {
        self.more_stats = true;
        self
    }

    /// Overrides the machine-derived abort requeue policy.
    pub fn abort_policy(mut self, policy: AbortPolicy) -> Self {
        self.abort_policy = Some(policy);
        self
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::new()
    }
}
