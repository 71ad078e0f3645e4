//! Typed per-worker storage.
//!
//! One slot per worker index, each on its own cache line. `local` resolves
//! through the thread-local worker index in O(1); `next` addresses the
//! neighboring worker for stealing. An optional binary merge hook combines
//! slots pairwise when the storage is reduced at teardown.

use std::ops::{Deref, DerefMut};

use crate::concurrency::{worker, CachePadded};

/// Cache-line-separated storage with one slot per worker.
pub struct PerWorker<T> {
    slots: Box<[CachePadded<T>]>,
    merge: Option<fn(&mut T, &mut T)>,
}

impl<T> PerWorker<T> {
    /// Creates storage for `workers` slots, each initialized by `init`
    /// with its worker index.
    pub fn new(workers: usize, init: impl FnMut(usize) -> T) -> Self {
        assert!(workers > 0, "per-worker storage needs at least one slot");
        Self {
            slots: (0..workers).map(init).map(CachePadded::new).collect(),
            merge: None,
        }
    }

    /// As [`PerWorker::new`], with a merge hook run when slots are reduced.
    pub fn with_merge(
        workers: usize,
        init: impl FnMut(usize) -> T,
        merge: fn(&mut T, &mut T),
    ) -> Self {
        let mut s = Self::new(workers, init);
        s.merge = Some(merge);
        s
    }

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when constructed with zero slots; never, by construction.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The calling worker's slot.
    #[inline]
    pub fn local(&self) -> &T {
        &self.slots[worker::current()]
    }

    /// The slot of worker `w`.
    #[inline]
    pub fn remote(&self, w: usize) -> &T {
        &self.slots[w]
    }

    /// The neighboring worker's slot (round-robin successor).
    #[inline]
    pub fn next(&self) -> &T {
        &self.slots[(worker::current() + 1) % self.slots.len()]
    }

    /// Iterates over all slots.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().map(Deref::deref)
    }

    /// Mutable access to slot `w`; requires exclusive ownership.
    pub fn get_mut(&mut self, w: usize) -> &mut T {
        &mut self.slots[w]
    }

    /// Reduces all slots pairwise into slot 0 using the merge hook, then
    /// returns slot 0. Without a hook this only returns slot 0.
    pub fn merge_all(&mut self) -> &mut T {
        if let Some(merge) = self.merge {
            for i in 1..self.slots.len() {
                let (first, rest) = self.slots.split_at_mut(i);
                merge(&mut first[0], &mut rest[0]);
            }
        }
        &mut self.slots[0]
    }
}

impl<T> Deref for PerWorker<T> {
    type Target = [CachePadded<T>];
    fn deref(&self) -> &Self::Target {
        &self.slots
    }
}

impl<T> DerefMut for PerWorker<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.slots
    }
}
