//! Unbounded shared chunked FIFO.
//!
//! Unlike [`ChunkedFifo`](super::ChunkedFifo), every worker pushes and
//! pops through global head/tail pointer locks, so items become visible to
//! all workers immediately. This is the requeue channel of the abort
//! handler and a building block for the bucketed structures. Empty leading
//! chunks are reclaimed lazily on the pop side, under the head lock.

use std::ptr;
use std::sync::Arc;

use crate::alloc::{FixedSizeHeap, PagePool};
use crate::concurrency::worklist::ring::FixedRing;
use crate::concurrency::worklist::Worklist;
use crate::concurrency::PtrLock;
use crate::runtime::Runtime;

struct Chunk<T, const K: usize> {
    ring: FixedRing<T, K>,
    next: PtrLock<Chunk<T, K>>,
}

/// Shared MPMC FIFO of linked fixed-capacity chunks.
pub struct SharedChunkedFifo<T: Send, const K: usize = 128> {
    /// First chunk; never null.
    head: PtrLock<Chunk<T, K>>,
    /// Last chunk; never null.
    tail: PtrLock<Chunk<T, K>>,
    heap: FixedSizeHeap,
}

// SAFETY: all chunk traffic happens under the head/tail pointer locks and
// the per-chunk next locks.
unsafe impl<T: Send, const K: usize> Send for SharedChunkedFifo<T, K> {}
unsafe impl<T: Send, const K: usize> Sync for SharedChunkedFifo<T, K> {}

impl<T: Send, const K: usize> SharedChunkedFifo<T, K> {
    /// Creates an empty queue drawing chunk storage from `rt`'s page pool.
    pub fn new(rt: &Runtime) -> Self {
        Self::with_pool(rt.pages().clone())
    }

    /// As [`SharedChunkedFifo::new`] with an explicit pool.
    pub fn with_pool(pool: Arc<PagePool>) -> Self {
        let heap = FixedSizeHeap::for_type::<Chunk<T, K>>(pool);
        let first = Self::alloc_chunk_in(&heap);
        Self {
            head: PtrLock::with(first),
            tail: PtrLock::with(first),
            heap,
        }
    }

    fn alloc_chunk_in(heap: &FixedSizeHeap) -> *mut Chunk<T, K> {
        let block = heap.alloc_block().as_ptr().cast::<Chunk<T, K>>();
        // SAFETY: block is sized and aligned for Chunk.
        unsafe {
            block.write(Chunk {
                ring: FixedRing::new(),
                next: PtrLock::new(),
            });
        }
        block
    }

    unsafe fn free_chunk(&self, chunk: *mut Chunk<T, K>) {
        ptr::drop_in_place(chunk);
        self.heap
            .free_block(ptr::NonNull::new_unchecked(chunk.cast::<u8>()));
    }

    /// Advances `head` past drained chunks. Caller holds the head lock and
    /// the current head chunk's next lock; on return the same invariant
    /// holds for the new head.
    unsafe fn reclaim_empty_locked(&self, mut h: *mut Chunk<T, K>) -> *mut Chunk<T, K> {
        while (*h).ring.is_empty() && !(*h).next.value().is_null() {
            let old = h;
            let n = (*old).next.value();
            (*n).next.lock();
            self.head.set_locked(n);
            (*old).next.unlock();
            self.free_chunk(old);
            h = n;
        }
        h
    }
}

impl<T: Send, const K: usize> Worklist<T> for SharedChunkedFifo<T, K> {
    fn push(&self, item: T) {
        self.tail.lock();
        let t = self.tail.value();
        debug_assert!(!t.is_null());
        // SAFETY: t is the live tail, protected by the tail lock; its next
        // lock orders us against pop-side reclamation.
        unsafe {
            (*t).next.lock();
            match (*t).ring.push_back(item) {
                Ok(()) => {
                    (*t).next.unlock();
                    self.tail.unlock();
                }
                Err(item) => {
                    // Tail chunk is full; append a fresh one.
                    let nc = Self::alloc_chunk_in(&self.heap);
                    if (*nc).ring.push_back(item).is_err() {
                        unreachable!("fresh chunk rejected a push");
                    }
                    (*nc).next.lock();
                    (*t).next.unlock_and_set(nc);
                    (*nc).next.unlock();
                    self.tail.unlock_and_set(nc);
                }
            }
        }
    }

    fn pop(&self) -> Option<T> {
        self.head.lock();
        let h = self.head.value();
        debug_assert!(!h.is_null());
        // SAFETY: h is the live head under the head lock.
        let ret = unsafe {
            (*h).next.lock();
            let h = self.reclaim_empty_locked(h);
            let ret = (*h).ring.pop_front();
            (*h).next.unlock();
            ret
        };
        self.head.unlock();
        ret
    }

    fn is_empty(&self) -> bool {
        self.head.lock();
        let h = self.head.value();
        // SAFETY: as in pop.
        let empty = unsafe {
            (*h).next.lock();
            let h = self.reclaim_empty_locked(h);
            let empty = (*h).ring.is_empty();
            (*h).next.unlock();
            empty
        };
        self.head.unlock();
        empty
    }
}

impl<T: Send, const K: usize> Drop for SharedChunkedFifo<T, K> {
    fn drop(&mut self) {
        let mut chunk = self.head.value();
        while !chunk.is_null() {
            // SAFETY: exclusive access during drop.
            unsafe {
                let next = (*chunk).next.value();
                self.free_chunk(chunk);
                chunk = next;
            }
        }
    }
}
