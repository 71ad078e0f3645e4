use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use amorph::alloc::PagePool;
use amorph::runtime::{for_each, LoopConfig, Runtime};

/// Interleaved alloc/free across threads: the page count tracks peak
/// simultaneous liveness, not allocation traffic.
#[test]
fn outstanding_tracks_peak_liveness() {
    let pool = Arc::new(PagePool::new(1));
    let allocations = AtomicUsize::new(0);
    thread::scope(|s| {
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            let allocations = &allocations;
            s.spawn(move || {
                for _ in 0..125 {
                    let pages: Vec<_> = (0..4).map(|_| pool.alloc_page()).collect();
                    allocations.fetch_add(pages.len(), Ordering::Relaxed);
                    for p in pages {
                        // SAFETY: just allocated, never shared.
                        unsafe { pool.free_page(p) };
                    }
                }
            });
        }
    });
    assert_eq!(allocations.load(Ordering::Relaxed), 4000);
    // Peak liveness is 8 threads x 4 pages; frees racing with empty-list
    // observations can add a page or two beyond that, never hundreds.
    let outstanding = pool.pages_outstanding();
    assert!(outstanding <= 64, "outstanding = {outstanding}");
    assert!(outstanding >= 4);
}

/// The same property through the executor, with pages cycling through
/// genuinely per-worker freelists.
#[test]
fn worker_freelists_recycle_under_for_each() {
    let rt = Runtime::builder().workers(8).build();
    let before = rt.pages().pages_outstanding();
    for_each(
        &rt,
        0..1000u32,
        |_, _| {
            let page = rt.pages().alloc_page();
            // SAFETY: freed before anyone else can observe it.
            unsafe { rt.pages().free_page(page) };
            Ok(())
        },
        LoopConfig::new()
            .loopname("page_churn")
            .disable_conflict_detection()
            .no_pushes(),
    );
    let grown = rt.pages().pages_outstanding() - before;
    // One live page per worker at a time, so growth is bounded by the
    // worker count rather than the thousand allocations.
    assert!(grown <= rt.workers(), "grown = {grown}");
}
