//! Locked baseline structures: LIFO, FIFO, and a priority queue, each a
//! single shared container behind a padded spinlock. Contentious, but
//! simple to reason about; the reference points for everything else.

use std::collections::{BinaryHeap, VecDeque};

use crate::concurrency::worklist::{SeqWorklist, Worklist};
use crate::concurrency::SpinLock;

/// Locked last-in-first-out list.
pub struct Lifo<T> {
    items: SpinLock<Vec<T>>,
}

impl<T> Lifo<T> {
    /// Creates an empty LIFO.
    pub fn new() -> Self {
        Self {
            items: SpinLock::new(Vec::new()),
        }
    }
}

impl<T> Default for Lifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Worklist<T> for Lifo<T> {
    fn push(&self, item: T) {
        self.items.lock().push(item);
    }

    fn pop(&self) -> Option<T> {
        self.items.lock().pop()
    }

    fn try_pop(&self) -> Option<T> {
        self.items.try_lock()?.pop()
    }

    fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// Locked first-in-first-out deque.
pub struct Fifo<T> {
    items: SpinLock<VecDeque<T>>,
}

impl<T> Fifo<T> {
    /// Creates an empty FIFO.
    pub fn new() -> Self {
        Self {
            items: SpinLock::new(VecDeque::new()),
        }
    }
}

impl<T> Default for Fifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Worklist<T> for Fifo<T> {
    fn push(&self, item: T) {
        self.items.lock().push_back(item);
    }

    fn pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    fn try_pop(&self) -> Option<T> {
        self.items.try_lock()?.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// Locked heap; `pop` returns the greatest item first. Wrap items in
/// [`std::cmp::Reverse`] for smallest-first order.
pub struct PriorityQueue<T: Ord> {
    items: SpinLock<BinaryHeap<T>>,
}

impl<T: Ord> PriorityQueue<T> {
    /// Creates an empty priority queue.
    pub fn new() -> Self {
        Self {
            items: SpinLock::new(BinaryHeap::new()),
        }
    }
}

impl<T: Ord> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + Send> Worklist<T> for PriorityQueue<T> {
    fn push(&self, item: T) {
        self.items.lock().push(item);
    }

    fn pop(&self) -> Option<T> {
        self.items.lock().pop()
    }

    fn try_pop(&self) -> Option<T> {
        self.items.try_lock()?.pop()
    }

    fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// Thread-private LIFO for use as a local layer.
pub struct SeqLifo<T> {
    items: Vec<T>,
}

impl<T> Default for SeqLifo<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Send> SeqWorklist<T> for SeqLifo<T> {
    fn push(&mut self, item: T) {
        self.items.push(item);
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Thread-private FIFO for use as a local layer.
pub struct SeqFifo<T> {
    items: VecDeque<T>,
}

impl<T> Default for SeqFifo<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T: Send> SeqWorklist<T> for SeqFifo<T> {
    fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifo_order() {
        let q = Lifo::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn fifo_order() {
        let q = Fifo::new();
        q.push_initial(0..5);
        assert_eq!(
            std::iter::from_fn(|| q.pop()).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn priority_pops_extremum() {
        let q = PriorityQueue::new();
        q.push(2);
        q.push(9);
        q.push(4);
        assert_eq!(q.pop(), Some(9));
        assert_eq!(q.pop(), Some(4));
        q.push(7);
        assert_eq!(q.pop(), Some(7));
        assert_eq!(q.pop(), Some(2));
        assert!(q.is_empty());
    }
}
