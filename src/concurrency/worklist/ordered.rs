//! Integer-priority bucketed structures.
//!
//! Each variant maps a work item to a bucket index through a caller
//! supplied indexer and keeps one inner worklist per bucket. Smaller
//! indices tend to be popped earlier; the ordering is best-effort, never a
//! guarantee, and cross-worker interleaving is unordered.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::concurrency::worklist::Worklist;
use crate::concurrency::PerWorker;

/// Maps items to bucket indices.
pub trait Indexer<T>: Send + Sync {
    /// The bucket metric of `item`.
    fn index(&self, item: &T) -> usize;
}

impl<T, F> Indexer<T> for F
where
    F: Fn(&T) -> usize + Send + Sync,
{
    fn index(&self, item: &T) -> usize {
        self(item)
    }
}

/// Strictly bucketed by an integer metric over a bounded range.
///
/// Buckets `0..=range`; indices beyond the range are clamped into the last
/// bucket. Each worker keeps a descending cursor: pushes of smaller
/// indices pull the cursor down, pops scan from the front on a cursor
/// miss.
pub struct OrderedByMetric<T, I, Q> {
    buckets: Box<[Q]>,
    indexer: I,
    cursor: PerWorker<AtomicUsize>,
    _marker: PhantomData<fn(T)>,
}

impl<T, I, Q> OrderedByMetric<T, I, Q>
where
    T: Send,
    I: Indexer<T>,
    Q: Worklist<T>,
{
    /// Creates buckets `0..=range`, each built by `bucket`.
    pub fn new(workers: usize, range: usize, indexer: I, mut bucket: impl FnMut() -> Q) -> Self {
        Self {
            buckets: (0..=range).map(|_| bucket()).collect(),
            indexer,
            cursor: PerWorker::new(workers, |_| AtomicUsize::new(0)),
            _marker: PhantomData,
        }
    }
}

impl<T, I, Q> Worklist<T> for OrderedByMetric<T, I, Q>
where
    T: Send,
    I: Indexer<T>,
    Q: Worklist<T>,
{
    fn push(&self, item: T) {
        let index = self.indexer.index(&item).min(self.buckets.len() - 1);
        self.buckets[index].push(item);
        let cur = self.cursor.local();
        if cur.load(Ordering::Relaxed) > index {
            cur.store(index, Ordering::Relaxed);
        }
    }

    fn pop(&self) -> Option<T> {
        let cur = self.cursor.local();
        let at = cur.load(Ordering::Relaxed);
        debug_assert!(at < self.buckets.len());
        if let Some(item) = self.buckets[at].try_pop() {
            return Some(item);
        }
        // Cursor bucket missed; scan from the front. Queues tend to stay
        // populated, so this picks up the best remaining index.
        for (i, bucket) in self.buckets.iter().enumerate() {
            if let Some(item) = bucket.try_pop() {
                cur.store(i, Ordering::Relaxed);
                return Some(item);
            }
        }
        cur.store(0, Ordering::Relaxed);
        None
    }

    fn is_empty(&self) -> bool {
        self.buckets.iter().all(Worklist::is_empty)
    }
}

/// Number of buckets in [`ApproxOrdered`]; a tuning knob, not a contract.
const APPROX_BUCKETS: usize = 2048;

/// Approximately ordered: bucket = index modulo a fixed bucket count, with
/// a circularly advancing per-worker cursor.
pub struct ApproxOrdered<T, I, Q> {
    buckets: Box<[Q]>,
    indexer: I,
    cursor: PerWorker<AtomicUsize>,
    _marker: PhantomData<fn(T)>,
}

impl<T, I, Q> ApproxOrdered<T, I, Q>
where
    T: Send,
    I: Indexer<T>,
    Q: Worklist<T>,
{
    /// Creates the fixed bucket array, each bucket built by `bucket`.
    pub fn new(workers: usize, indexer: I, mut bucket: impl FnMut() -> Q) -> Self {
        Self {
            buckets: (0..APPROX_BUCKETS).map(|_| bucket()).collect(),
            indexer,
            cursor: PerWorker::new(workers, |_| AtomicUsize::new(0)),
            _marker: PhantomData,
        }
    }
}

impl<T, I, Q> Worklist<T> for ApproxOrdered<T, I, Q>
where
    T: Send,
    I: Indexer<T>,
    Q: Worklist<T>,
{
    fn push(&self, item: T) {
        let index = self.indexer.index(&item) % APPROX_BUCKETS;
        self.buckets[index].push(item);
    }

    fn pop(&self) -> Option<T> {
        let cur = self.cursor.local();
        let mut at = cur.load(Ordering::Relaxed);
        if let Some(item) = self.buckets[at].pop() {
            return Some(item);
        }
        for _ in 0..APPROX_BUCKETS {
            at = (at + 1) % APPROX_BUCKETS;
            if let Some(item) = self.buckets[at].try_pop() {
                cur.store(at, Ordering::Relaxed);
                return Some(item);
            }
        }
        cur.store(at, Ordering::Relaxed);
        None
    }

    fn is_empty(&self) -> bool {
        self.buckets.iter().all(Worklist::is_empty)
    }
}

/// Log-ordered: bucket = ⌊log₂(index)⌋, with bin 0 shared by indices 0
/// and 1. Coarse, but keeps the bucket count tiny for wide metrics.
pub struct LogOrdered<T, I, Q> {
    bins: Box<[Q]>,
    indexer: I,
    cursor: PerWorker<AtomicUsize>,
    _marker: PhantomData<fn(T)>,
}

const LOG_BINS: usize = usize::BITS as usize;

fn log_bin(index: usize) -> usize {
    if index == 0 {
        0
    } else {
        (usize::BITS - 1 - index.leading_zeros()) as usize
    }
}

impl<T, I, Q> LogOrdered<T, I, Q>
where
    T: Send,
    I: Indexer<T>,
    Q: Worklist<T>,
{
    /// Creates one bin per possible ⌊log₂⌋ value, each built by `bucket`.
    pub fn new(workers: usize, indexer: I, mut bucket: impl FnMut() -> Q) -> Self {
        Self {
            bins: (0..LOG_BINS).map(|_| bucket()).collect(),
            indexer,
            cursor: PerWorker::new(workers, |_| AtomicUsize::new(0)),
            _marker: PhantomData,
        }
    }
}

impl<T, I, Q> Worklist<T> for LogOrdered<T, I, Q>
where
    T: Send,
    I: Indexer<T>,
    Q: Worklist<T>,
{
    fn push(&self, item: T) {
        let bin = log_bin(self.indexer.index(&item));
        self.bins[bin].push(item);
    }

    fn pop(&self) -> Option<T> {
        let cur = self.cursor.local();
        let at = cur.load(Ordering::Relaxed);
        if let Some(item) = self.bins[at].pop() {
            return Some(item);
        }
        // Scan upward from the cursor; a full miss rewinds it so freshly
        // pushed low bins are found on the next pass.
        for i in at..LOG_BINS {
            if let Some(item) = self.bins[i].pop() {
                cur.store(i, Ordering::Relaxed);
                return Some(item);
            }
        }
        cur.store(0, Ordering::Relaxed);
        None
    }

    fn is_empty(&self) -> bool {
        self.bins.iter().all(Worklist::is_empty)
    }
}
