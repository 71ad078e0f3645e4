//! The `for_each` executor.
//!
//! Workers loop over: pop a batch from the work structure, run the
//! operator speculatively on each item, commit or roll back, drain the
//! local abort queue, and cooperate in termination detection. A barrier
//! separates refill rounds so structures whose cursors missed live items
//! get a fresh scan.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Instant;

use crate::alloc::IterAlloc;
use crate::concurrency::worklist::{ChunkedFifo, Worklist};
use crate::concurrency::{CachePadded, SpinLock};
use crate::runtime::stats::StatSink;
use crate::runtime::{
    AbortHandler, IterResult, LoopConfig, LoopStats, LoopSummary, Runtime, TokenRing, UserContext,
};

/// Iteration bound for workers that must come up for air between batches:
/// socket leaders (which service diffused aborts) and any worker on a
/// loop with `parallel_break`.
const CHECK_INTERVAL: u32 = 64;

/// Runs `op` over `seed` and everything it transitively pushes, on the
/// default chunked-FIFO work structure. Returns once the engine reaches
/// global quiescence or a committed break.
pub fn for_each<'g, T, I, F>(rt: &Runtime, seed: I, op: F, cfg: LoopConfig) -> LoopSummary
where
    T: Send,
    I: IntoIterator<Item = T>,
    F: Fn(&T, &UserContext<'g, T>) -> IterResult + Sync,
{
    let wl = ChunkedFifo::<T, 64>::new(rt);
    for_each_with(rt, seed, wl, op, cfg)
}

/// As [`for_each`] with a caller-chosen work structure.
pub fn for_each_with<'g, T, W, I, F>(
    rt: &Runtime,
    seed: I,
    wl: W,
    op: F,
    cfg: LoopConfig,
) -> LoopSummary
where
    T: Send,
    W: Worklist<T>,
    I: IntoIterator<Item = T>,
    F: Fn(&T, &UserContext<'g, T>) -> IterResult + Sync,
{
    let workers = rt.workers();
    let handler = match cfg.abort_policy {
        Some(policy) => AbortHandler::with_policy(rt, policy),
        None => AbortHandler::new(rt),
    };
    let exec = Executor {
        rt,
        wl,
        op,
        term: TokenRing::new(workers),
        barrier: Barrier::new(workers),
        handler,
        broke: CachePadded::new(AtomicBool::new(false)),
        sink: StatSink::new(workers),
        seeds: split_seed(seed.into_iter().collect(), workers),
        could_abort: cfg.conflict_detection && workers > 1,
        cfg,
        _graph: std::marker::PhantomData,
    };
    exec.run()
}

/// Contiguous per-worker shares of the seed range; each worker seeds its
/// own slice through `push_initial`.
fn split_seed<T>(items: Vec<T>, workers: usize) -> Box<[SpinLock<Option<Vec<T>>>]> {
    let share = items.len().div_ceil(workers).max(1);
    let mut iter = items.into_iter();
    (0..workers)
        .map(|_| SpinLock::new(Some(iter.by_ref().take(share).collect())))
        .collect()
}

struct Executor<'rt, 'g, T: Send, W, F> {
    rt: &'rt Runtime,
    wl: W,
    op: F,
    cfg: LoopConfig,
    term: TokenRing,
    barrier: Barrier,
    handler: AbortHandler<T>,
    broke: CachePadded<AtomicBool>,
    sink: StatSink,
    seeds: Box<[SpinLock<Option<Vec<T>>>]>,
    could_abort: bool,
    _graph: std::marker::PhantomData<&'g crate::runtime::Lockable>,
}

impl<'rt, 'g, T, W, F> Executor<'rt, 'g, T, W, F>
where
    T: Send,
    W: Worklist<T>,
    F: Fn(&T, &UserContext<'g, T>) -> IterResult + Sync,
{
    fn run(self) -> LoopSummary {
        let start = Instant::now();
        tracing::debug!(
            loopname = self.cfg.loopname,
            workers = self.rt.workers(),
            conflict_detection = self.could_abort,
            "loop starting"
        );

        self.rt.run(|w| self.worker(w));

        let totals = self.sink.totals();
        if self.cfg.more_stats {
            self.sink.log_phase_timers(self.cfg.loopname);
        }
        let broke = self.broke.load(Ordering::SeqCst);
        let summary = LoopSummary {
            iterations: totals.iterations,
            commits: totals.iterations - totals.conflicts,
            conflicts: totals.conflicts,
            pushes: totals.pushes,
            duration: start.elapsed(),
            broke,
        };
        tracing::debug!(
            loopname = self.cfg.loopname,
            iterations = summary.iterations,
            commits = summary.commits,
            conflicts = summary.conflicts,
            pushes = summary.pushes,
            duration_us = summary.duration.as_micros() as u64,
            broke,
            "loop finished"
        );
        summary
    }

    fn worker(&self, w: usize) {
        let init_start = Instant::now();
        let seed = self.seeds[w].lock().take().unwrap_or_default();
        self.wl.push_initial(seed);
        self.term.initialize_thread();
        let init = init_start.elapsed();

        self.barrier.wait();

        let exec_start = Instant::now();
        let stats = self.go(w);
        self.sink.deposit(stats, init, exec_start.elapsed());
    }

    fn go(&self, w: usize) -> LoopStats {
        let is_leader = self.rt.topology().is_leader(w);
        let mut stats = LoopStats::default();
        let mut facing = UserContext::new(
            self.could_abort,
            self.cfg.pushes,
            self.cfg.parallel_break,
            self.cfg
                .per_iter_alloc
                .then(|| IterAlloc::new(Arc::clone(self.rt.pages()))),
        );

        loop {
            loop {
                let mut did_work = false;
                if self.could_abort || self.cfg.parallel_break {
                    let limit = if self.cfg.parallel_break || is_leader {
                        CHECK_INTERVAL
                    } else {
                        0
                    };
                    did_work |= self.run_queue(&mut facing, &mut stats, limit);
                    if self.could_abort {
                        did_work |= self.drain_aborts(&mut facing, &mut stats);
                    }
                } else {
                    did_work |= self.run_queue_simple(&mut facing, &mut stats);
                }

                self.term.signal_worked(did_work);
                // Let the token propagate.
                std::hint::spin_loop();

                if !self.term.working() {
                    break;
                }
                if self.cfg.parallel_break && self.broke.load(Ordering::SeqCst) {
                    break;
                }
            }

            // Quiescent (or broke). All workers reach this point with the
            // same stable view, so the refill decision is unanimous.
            if self.wl.is_empty() {
                break;
            }
            if self.cfg.parallel_break && self.broke.load(Ordering::SeqCst) {
                break;
            }

            self.term.initialize_thread();
            self.barrier.wait();
        }

        stats
    }

    /// Runs up to `limit` iterations from the main queue (0 = drain).
    fn run_queue(
        &self,
        facing: &mut UserContext<'g, T>,
        stats: &mut LoopStats,
        limit: u32,
    ) -> bool {
        let mut n = 0;
        let mut did_work = false;
        while limit == 0 || n < limit {
            if self.cfg.parallel_break && self.broke.load(Ordering::SeqCst) {
                break;
            }
            let Some(item) = self.wl.pop() else { break };
            did_work = true;
            n += 1;
            if self.process(&item, facing, stats).is_err() {
                assert!(
                    self.could_abort,
                    "operator raised a conflict on a loop without conflict detection"
                );
                self.abort(facing, stats);
                self.handler.push(item);
            }
        }
        did_work
    }

    /// Unbounded drain without the rollback frame; only valid when
    /// conflicts and breaks are off.
    fn run_queue_simple(&self, facing: &mut UserContext<'g, T>, stats: &mut LoopStats) -> bool {
        let mut did_work = false;
        while let Some(item) = self.wl.pop() {
            did_work = true;
            if self.process(&item, facing, stats).is_err() {
                panic!("operator raised a conflict on a loop without conflict detection");
            }
        }
        did_work
    }

    /// Drains the local abort queue, requeueing re-aborts through the
    /// diffusion policy.
    fn drain_aborts(&self, facing: &mut UserContext<'g, T>, stats: &mut LoopStats) -> bool {
        let mut did_work = false;
        while !(self.cfg.parallel_break && self.broke.load(Ordering::SeqCst)) {
            let Some(aborted) = self.handler.local_queue().pop() else {
                break;
            };
            did_work = true;
            if self.process(&aborted.item, facing, stats).is_err() {
                self.abort(facing, stats);
                self.handler.requeue(aborted, &self.term);
            }
        }
        did_work
    }

    /// One speculative iteration: run the operator, then commit. An `Err`
    /// means the iteration conflicted and nothing was committed.
    fn process(
        &self,
        item: &T,
        facing: &mut UserContext<'g, T>,
        stats: &mut LoopStats,
    ) -> IterResult {
        facing.start_iteration();
        stats.iterations += 1;
        (self.op)(item, facing)?;
        self.commit(facing, stats);
        Ok(())
    }

    fn commit(&self, facing: &mut UserContext<'g, T>, stats: &mut LoopStats) {
        if self.cfg.pushes {
            stats.pushes += facing.drain_pushes(|item| self.wl.push(item));
        }
        facing.reset_alloc();
        if self.could_abort {
            facing.commit_iteration();
        }
        if self.cfg.parallel_break && facing.take_break_request() {
            self.broke.store(true, Ordering::SeqCst);
        }
    }

    fn abort(&self, facing: &mut UserContext<'g, T>, stats: &mut LoopStats) {
        stats.conflicts += 1;
        facing.cancel_iteration();
        facing.reset_alloc();
    }
}
