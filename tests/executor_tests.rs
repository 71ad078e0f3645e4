use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use amorph::concurrency::worklist::{Fifo, Lifo, LogOrdered};
use amorph::runtime::{
    for_each, for_each_with, AbortHandler, AbortPolicy, Conflict, LoopConfig, Runtime, TokenRing,
};
use amorph::Lockable;
use amorph::Worklist;

#[test]
fn atomic_sum_over_lifo() {
    let rt = Runtime::builder().workers(4).build();
    let sum = AtomicU64::new(0);
    let summary = for_each_with(
        &rt,
        1..=1000u64,
        Lifo::new(),
        |&x, _ctx| {
            sum.fetch_add(x, Ordering::Relaxed);
            Ok(())
        },
        LoopConfig::new()
            .loopname("atomic_sum")
            .disable_conflict_detection(),
    );
    assert_eq!(sum.load(Ordering::Relaxed), 500_500);
    assert_eq!(summary.iterations, 1000);
    assert_eq!(summary.commits, 1000);
    assert_eq!(summary.conflicts, 0);
}

#[test]
fn countdown_pushes_drain_completely() {
    let rt = Runtime::builder().workers(4).build();
    let summary = for_each(
        &rt,
        1..=100u32,
        |&x, ctx| {
            if x > 1 {
                ctx.push(x - 1);
            }
            Ok(())
        },
        LoopConfig::new()
            .loopname("countdown")
            .disable_conflict_detection(),
    );
    // Each seed x spawns the chain x, x-1, ..., 1.
    assert_eq!(summary.iterations, 5050);
    assert_eq!(summary.pushes, 4950);
    assert_eq!(summary.commits, 5050);
}

#[test]
fn lock_pairs_all_commit_eventually() {
    let rt = Runtime::builder().workers(2).build();
    let locks: Vec<Lockable> = (0..7).map(|_| Lockable::new()).collect();
    let committed = AtomicU64::new(0);
    let wl = LogOrdered::new(rt.workers(), |x: &usize| *x, Fifo::<usize>::new);
    let summary = for_each_with(
        &rt,
        0..1000usize,
        wl,
        |&x, ctx| {
            ctx.acquire(&locks[x % 7])?;
            ctx.acquire(&locks[(x + 1) % 7])?;
            committed.fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
        LoopConfig::new().loopname("lock_pairs"),
    );
    assert_eq!(committed.load(Ordering::Relaxed), 1000);
    assert_eq!(summary.commits, 1000);
    assert_eq!(summary.iterations, 1000 + summary.conflicts);
    assert!(locks.iter().all(|l| !l.is_owned()));
}

#[test]
fn break_bounds_in_flight_commits() {
    let rt = Runtime::builder().workers(4).build();
    let commits = AtomicU64::new(0);
    let summary = for_each(
        &rt,
        0..100_000u32,
        |_, ctx| {
            // Keep iterations long relative to flag publication so the
            // in-flight window is at most one iteration per worker.
            let until = Instant::now() + Duration::from_micros(200);
            while Instant::now() < until {
                std::hint::spin_loop();
            }
            if commits.fetch_add(1, Ordering::SeqCst) + 1 == 50 {
                ctx.break_loop();
            }
            Ok(())
        },
        LoopConfig::new()
            .loopname("breaker")
            .disable_conflict_detection()
            .parallel_break(),
    );
    assert!(summary.broke);
    assert!(
        summary.commits <= 50 + (rt.workers() as u64 - 1),
        "commits after break must be bounded by items in flight: {}",
        summary.commits
    );
}

#[test]
fn empty_range_terminates_immediately() {
    let rt = Runtime::builder().workers(4).build();
    let summary = for_each(
        &rt,
        std::iter::empty::<u32>(),
        |_, _| Ok(()),
        LoopConfig::new().loopname("empty"),
    );
    assert_eq!(summary.iterations, 0);
    assert_eq!(summary.commits, 0);
    assert!(!summary.broke);
}

#[test]
fn conflict_once_then_succeed() {
    let rt = Runtime::builder().workers(2).build();
    let first = AtomicBool::new(true);
    let summary = for_each(
        &rt,
        [42u32],
        |_, _| {
            if first.swap(false, Ordering::SeqCst) {
                Err(Conflict)
            } else {
                Ok(())
            }
        },
        LoopConfig::new().loopname("conflict_once"),
    );
    assert_eq!(summary.commits, 1);
    assert_eq!(summary.conflicts, 1);
    assert_eq!(summary.iterations, 2);
}

#[test]
fn aborted_pushes_are_invisible() {
    let rt = Runtime::builder().workers(2).build();
    let counts = [AtomicU32::new(0), AtomicU32::new(0)];
    let first = AtomicBool::new(true);
    let summary = for_each(
        &rt,
        [0usize],
        |&x, ctx| {
            if x == 0 {
                ctx.push(1);
                if first.swap(false, Ordering::SeqCst) {
                    return Err(Conflict);
                }
            }
            counts[x].fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
        LoopConfig::new().loopname("abort_rollback"),
    );
    // The push from the aborted attempt was discarded; only the committed
    // attempt's push materialized.
    assert_eq!(counts[0].load(Ordering::Relaxed), 1);
    assert_eq!(counts[1].load(Ordering::Relaxed), 1);
    assert_eq!(summary.pushes, 1);
    assert_eq!(summary.commits, 2);
    assert_eq!(summary.conflicts, 1);
}

#[test]
fn push_then_break_is_clean() {
    let rt = Runtime::builder().workers(2).build();
    let summary = for_each(
        &rt,
        [0u32],
        |&x, ctx| {
            if x == 0 {
                for i in 1..=10 {
                    ctx.push(i);
                }
                ctx.break_loop();
            }
            Ok(())
        },
        LoopConfig::new()
            .loopname("push_break")
            .disable_conflict_detection()
            .parallel_break(),
    );
    assert!(summary.broke);
    assert_eq!(summary.pushes, 10);
    // The pushed items may or may not have run before the break landed.
    assert!(summary.commits >= 1 && summary.commits <= 11);
}

#[test]
fn scratch_allocations_live_for_one_iteration() {
    let rt = Runtime::builder().workers(2).build();
    let sum = AtomicU64::new(0);
    for_each(
        &rt,
        0..100u64,
        |&x, ctx| {
            let scratch = ctx.alloc().alloc_slice_copy(&[x; 8]);
            scratch[0] += 1;
            sum.fetch_add(scratch.iter().sum::<u64>(), Ordering::Relaxed);
            Ok(())
        },
        LoopConfig::new()
            .loopname("scratch")
            .disable_conflict_detection()
            .per_iter_alloc(),
    );
    // Each iteration contributes 8x + 1.
    assert_eq!(sum.load(Ordering::Relaxed), (0..100u64).map(|x| 8 * x + 1).sum());
}

#[test]
fn retry_counts_never_decrease() {
    let rt = Runtime::builder().workers(1).build();
    let ring = TokenRing::new(1);
    let handler: AbortHandler<u32> = AbortHandler::with_policy(&rt, AbortPolicy::Eager);
    handler.push(7);
    let mut retries = 0;
    for _ in 0..5 {
        let item = handler.local_queue().pop().expect("eager keeps it local");
        assert!(item.retries > retries);
        retries = item.retries;
        handler.requeue(item, &ring);
    }
    assert_eq!(retries, 5);
}

#[test]
fn single_worker_runs_without_speculation() {
    let rt = Runtime::builder().workers(1).build();
    let lock = Lockable::new();
    let hits = AtomicU32::new(0);
    let summary = for_each(
        &rt,
        0..64u32,
        |_, ctx| {
            // With one worker, lock acquisition short-circuits.
            ctx.acquire(&lock)?;
            hits.fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
        LoopConfig::new().loopname("solo"),
    );
    assert_eq!(hits.load(Ordering::Relaxed), 64);
    assert_eq!(summary.conflicts, 0);
}
