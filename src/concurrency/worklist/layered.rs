//! Local/global layerings.
//!
//! [`LocalQueues`] gives each worker a thread-private inner queue and
//! routes aborted or cross-worker traffic through a shared global queue.
//! [`LocalFilter`] adds an index threshold: items at or below the worker's
//! current priority stay local, the rest go global.

use std::cell::UnsafeCell;
use std::marker::PhantomData;

use crate::concurrency::worklist::ordered::Indexer;
use crate::concurrency::worklist::{SeqWorklist, Worklist};
use crate::concurrency::PerWorker;

/// Thread-private local queues over a shared global queue.
///
/// `push` is local (the common case: iterations usually consume their own
/// pushes), `aborted` goes global so a different worker can pick the item
/// up, and `pop` drains local work before touching the shared side.
pub struct LocalQueues<T, L, G> {
    locals: PerWorker<UnsafeCell<L>>,
    global: G,
    _marker: PhantomData<fn(T)>,
}

// SAFETY: each local slot is only touched by the thread bound to its
// worker index; the global queue is concurrent.
unsafe impl<T, L: Send, G: Send> Send for LocalQueues<T, L, G> {}
unsafe impl<T, L: Send, G: Sync> Sync for LocalQueues<T, L, G> {}

impl<T, L, G> LocalQueues<T, L, G>
where
    T: Send,
    L: SeqWorklist<T>,
    G: Worklist<T>,
{
    /// Creates default-constructed local queues over `global`.
    pub fn new(workers: usize, global: G) -> Self {
        Self {
            locals: PerWorker::new(workers, |_| UnsafeCell::new(L::default())),
            global,
            _marker: PhantomData,
        }
    }

    fn with_local<R>(&self, f: impl FnOnce(&mut L) -> R) -> R {
        // SAFETY: one thread per worker index; no reentrancy below.
        f(unsafe { &mut *self.locals.local().get() })
    }
}

impl<T, L, G> Worklist<T> for LocalQueues<T, L, G>
where
    T: Send,
    L: SeqWorklist<T>,
    G: Worklist<T>,
{
    fn push(&self, item: T) {
        self.with_local(|l| l.push(item));
    }

    fn pop(&self) -> Option<T> {
        self.with_local(|l| l.pop()).or_else(|| self.global.pop())
    }

    fn is_empty(&self) -> bool {
        self.with_local(|l| l.is_empty()) && self.global.is_empty()
    }

    fn aborted(&self, item: T) {
        self.global.push(item);
    }

    fn push_initial<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        for item in items {
            self.global.push(item);
        }
    }
}

struct FilterSlot<L> {
    queue: L,
    /// Highest index still considered local.
    current: usize,
}

/// Local/global layering with an index filter.
///
/// Items whose metric is at or below the worker's cursor stay local; the
/// cursor follows the metric of items drained from the global side, so a
/// worker chewing through priority level `p` keeps level-`p` pushes to
/// itself.
pub struct LocalFilter<T, I, L, G> {
    slots: PerWorker<UnsafeCell<FilterSlot<L>>>,
    global: G,
    indexer: I,
    _marker: PhantomData<fn(T)>,
}

// SAFETY: as for LocalQueues.
unsafe impl<T, I: Send, L: Send, G: Send> Send for LocalFilter<T, I, L, G> {}
unsafe impl<T, I: Sync, L: Send, G: Sync> Sync for LocalFilter<T, I, L, G> {}

impl<T, I, L, G> LocalFilter<T, I, L, G>
where
    T: Send,
    I: Indexer<T>,
    L: SeqWorklist<T>,
    G: Worklist<T>,
{
    /// Creates the layering over `global` with the given indexer.
    pub fn new(workers: usize, indexer: I, global: G) -> Self {
        Self {
            slots: PerWorker::new(workers, |_| {
                UnsafeCell::new(FilterSlot {
                    queue: L::default(),
                    current: 0,
                })
            }),
            global,
            indexer,
            _marker: PhantomData,
        }
    }

    fn with_slot<R>(&self, f: impl FnOnce(&mut FilterSlot<L>) -> R) -> R {
        // SAFETY: one thread per worker index; no reentrancy below.
        f(unsafe { &mut *self.slots.local().get() })
    }
}

impl<T, I, L, G> Worklist<T> for LocalFilter<T, I, L, G>
where
    T: Send,
    I: Indexer<T>,
    L: SeqWorklist<T>,
    G: Worklist<T>,
{
    fn push(&self, item: T) {
        let index = self.indexer.index(&item);
        let keep_local = self.with_slot(|s| {
            if index <= s.current {
                s.queue.push(item);
                None
            } else {
                Some(item)
            }
        });
        if let Some(item) = keep_local {
            self.global.push(item);
        }
    }

    fn pop(&self) -> Option<T> {
        if let Some(item) = self.with_slot(|s| s.queue.pop()) {
            return Some(item);
        }
        let item = self.global.pop()?;
        let index = self.indexer.index(&item);
        self.with_slot(|s| s.current = index);
        Some(item)
    }

    fn is_empty(&self) -> bool {
        self.with_slot(|s| s.queue.is_empty()) && self.global.is_empty()
    }

    fn push_initial<I2>(&self, items: I2)
    where
        I2: IntoIterator<Item = T>,
    {
        for item in items {
            self.global.push(item);
        }
    }
}
