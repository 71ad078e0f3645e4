//! Steal-local layout: one inner queue per worker, with pops falling back
//! to the neighboring worker's queue.

use std::marker::PhantomData;

use crate::concurrency::worklist::Worklist;
use crate::concurrency::PerWorker;

/// Per-worker queues with neighbor stealing.
///
/// `push` always goes to the calling worker's queue; `pop` tries the local
/// queue and then the round-robin successor's. The inner queue must be
/// concurrent, since neighbors pop from it.
pub struct StealLocal<T, Q> {
    queues: PerWorker<Q>,
    _marker: PhantomData<fn(T)>,
}

impl<T, Q> StealLocal<T, Q>
where
    T: Send,
    Q: Worklist<T>,
{
    /// Creates one inner queue per worker using `queue`.
    pub fn new(workers: usize, mut queue: impl FnMut() -> Q) -> Self {
        Self {
            queues: PerWorker::new(workers, |_| queue()),
            _marker: PhantomData,
        }
    }
}

impl<T, Q> Worklist<T> for StealLocal<T, Q>
where
    T: Send,
    Q: Worklist<T>,
{
    fn push(&self, item: T) {
        self.queues.local().push(item);
    }

    fn pop(&self) -> Option<T> {
        if let Some(item) = self.queues.local().pop() {
            return Some(item);
        }
        self.queues.next().pop()
    }

    fn try_pop(&self) -> Option<T> {
        if let Some(item) = self.queues.local().try_pop() {
            return Some(item);
        }
        self.queues.next().try_pop()
    }

    fn is_empty(&self) -> bool {
        self.queues.iter().all(Worklist::is_empty)
    }
}
