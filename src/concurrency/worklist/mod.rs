//! Composable work-item containers.
//!
//! Every scheduling policy in the runtime is a [`Worklist`]: LIFO and FIFO
//! baselines behind a padded spinlock, a chunked FIFO with thread-private
//! chunks and bulk handoff, integer-priority bucketed structures, a
//! steal-from-neighbor layout, and local/global layerings. Structures are
//! parameterized on their inner containers so they nest (a local/global
//! layering whose global side is a log-bucketed structure of chunked
//! FIFOs, say).
//!
//! Concurrent structures implement [`Worklist`]; thread-private inners
//! embedded one-per-worker implement [`SeqWorklist`].

mod chunked;
mod layered;
mod mpsc;
mod ordered;
pub(crate) mod ring;
mod shared;
mod simple;
mod stealing;

pub use chunked::ChunkedFifo;
pub use layered::{LocalFilter, LocalQueues};
pub use mpsc::MpScFifo;
pub use ordered::{ApproxOrdered, Indexer, LogOrdered, OrderedByMetric};
pub use shared::SharedChunkedFifo;
pub use simple::{Fifo, Lifo, PriorityQueue, SeqFifo, SeqLifo};
pub use stealing::StealLocal;

/// A concurrent work-item container.
///
/// `push` is infallible once the structure is constructed; `pop` returning
/// `None` means "nothing visible to this worker right now", not global
/// emptiness; the executor pairs it with termination detection.
pub trait Worklist<T: Send>: Send + Sync {
    /// Inserts a work item.
    fn push(&self, item: T);

    /// Removes a work item, trying as hard as the structure allows.
    fn pop(&self) -> Option<T>;

    /// Removes a work item while trying not as hard to take locks.
    fn try_pop(&self) -> Option<T> {
        self.pop()
    }

    /// True if the structure appears globally empty. Racy by nature; exact
    /// only once all workers have quiesced.
    fn is_empty(&self) -> bool;

    /// Re-insertion channel for items whose iteration aborted.
    fn aborted(&self, item: T) {
        self.push(item);
    }

    /// Seeds the structure with the calling worker's share of the initial
    /// range. Called once per worker before the loop starts.
    fn push_initial<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
        Self: Sized,
    {
        for item in items {
            self.push(item);
        }
    }
}

/// A thread-private work-item container, used as the per-worker layer
/// inside [`LocalQueues`] and [`LocalFilter`].
pub trait SeqWorklist<T>: Send + Default {
    /// Inserts a work item.
    fn push(&mut self, item: T);
    /// Removes a work item.
    fn pop(&mut self) -> Option<T>;
    /// True when no items remain.
    fn is_empty(&self) -> bool;
}
