//! Chunked multi-producer multi-consumer FIFO.
//!
//! Each worker privately owns a `cur` chunk (pop side) and a `next` chunk
//! (push side); full chunks are handed off in bulk to a global list behind
//! a pointer lock. Most operations touch only thread-private state, so the
//! shared-list cost is amortized over a chunk's worth of items.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::Arc;

use crate::alloc::{FixedSizeHeap, PagePool};
use crate::concurrency::worklist::ring::FixedRing;
use crate::concurrency::worklist::Worklist;
use crate::concurrency::{PerWorker, PtrLock};
use crate::runtime::Runtime;

struct Chunk<T, const K: usize> {
    ring: FixedRing<T, K>,
    next: *mut Chunk<T, K>,
}

struct WorkerChunks<T, const K: usize> {
    /// Pop side.
    cur: *mut Chunk<T, K>,
    /// Push side; handed to the global list when full.
    next: *mut Chunk<T, K>,
}

/// Chunked MPMC FIFO with thread-private chunks and bulk handoff.
///
/// The default work structure of the executor.
pub struct ChunkedFifo<T: Send, const K: usize = 64> {
    slots: PerWorker<UnsafeCell<WorkerChunks<T, K>>>,
    /// Global singly-linked list of full chunks.
    head: PtrLock<Chunk<T, K>>,
    heap: FixedSizeHeap,
}

// SAFETY: per-worker slots are only touched by the thread bound to that
// worker index; the global list is guarded by its pointer lock.
unsafe impl<T: Send, const K: usize> Send for ChunkedFifo<T, K> {}
unsafe impl<T: Send, const K: usize> Sync for ChunkedFifo<T, K> {}

impl<T: Send, const K: usize> ChunkedFifo<T, K> {
    /// Creates an empty queue for `rt`'s workers.
    pub fn new(rt: &Runtime) -> Self {
        Self::with_pool(rt.workers(), rt.pages().clone())
    }

    /// As [`ChunkedFifo::new`] with an explicit worker count and pool.
    pub fn with_pool(workers: usize, pool: Arc<PagePool>) -> Self {
        Self {
            slots: PerWorker::new(workers, |_| {
                UnsafeCell::new(WorkerChunks {
                    cur: ptr::null_mut(),
                    next: ptr::null_mut(),
                })
            }),
            head: PtrLock::new(),
            heap: FixedSizeHeap::for_type::<Chunk<T, K>>(pool),
        }
    }

    fn alloc_chunk(&self) -> *mut Chunk<T, K> {
        let block = self.heap.alloc_block().as_ptr().cast::<Chunk<T, K>>();
        // SAFETY: the heap hands out blocks sized and aligned for Chunk.
        unsafe {
            block.write(Chunk {
                ring: FixedRing::new(),
                next: ptr::null_mut(),
            });
        }
        block
    }

    unsafe fn free_chunk(&self, chunk: *mut Chunk<T, K>) {
        ptr::drop_in_place(chunk);
        self.heap
            .free_block(ptr::NonNull::new_unchecked(chunk.cast::<u8>()));
    }

    /// Appends a full chunk to the global list.
    fn push_chunk(&self, chunk: *mut Chunk<T, K>) {
        self.head.lock();
        let first = self.head.value();
        if first.is_null() {
            self.head.unlock_and_set(chunk);
            return;
        }
        // SAFETY: list nodes are live chunks; traversal is under the lock.
        unsafe {
            let mut last = first;
            while !(*last).next.is_null() {
                last = (*last).next;
            }
            (*last).next = chunk;
        }
        self.head.unlock();
    }

    /// Detaches the first chunk of the global list, if any.
    fn pop_chunk(&self) -> *mut Chunk<T, K> {
        if self.head.value().is_null() {
            return ptr::null_mut();
        }
        self.head.lock();
        let r = self.head.value();
        if r.is_null() {
            self.head.unlock();
        } else {
            // SAFETY: r is live and protected by the head lock.
            unsafe {
                self.head.unlock_and_set((*r).next);
                (*r).next = ptr::null_mut();
            }
        }
        r
    }

    /// Runs `f` on the calling worker's private chunk pair.
    ///
    /// Sound because the thread pool binds one thread per worker index and
    /// nothing here re-enters.
    fn with_slot<R>(&self, f: impl FnOnce(&mut WorkerChunks<T, K>) -> R) -> R {
        // SAFETY: see above.
        f(unsafe { &mut *self.slots.local().get() })
    }
}

impl<T: Send, const K: usize> Worklist<T> for ChunkedFifo<T, K> {
    fn push(&self, item: T) {
        let full = self.with_slot(|s| {
            // SAFETY: `next` is private to this worker while non-null.
            if !s.next.is_null() && unsafe { (*s.next).ring.is_full() } {
                let full = s.next;
                s.next = ptr::null_mut();
                Some(full)
            } else {
                None
            }
        });
        if let Some(full) = full {
            self.push_chunk(full);
        }
        self.with_slot(|s| {
            if s.next.is_null() {
                s.next = self.alloc_chunk();
            }
            // SAFETY: `next` is private and was just ensured non-full.
            unsafe {
                if (*s.next).ring.push_back(item).is_err() {
                    unreachable!("fresh or non-full chunk rejected a push");
                }
            }
        });
    }

    fn pop(&self) -> Option<T> {
        let refill = self.with_slot(|s| {
            if !s.cur.is_null() && unsafe { (*s.cur).ring.is_empty() } {
                let empty = s.cur;
                s.cur = ptr::null_mut();
                Some(empty)
            } else {
                None
            }
        });
        if let Some(empty) = refill {
            // SAFETY: drained chunk owned solely by this worker.
            unsafe { self.free_chunk(empty) };
        }
        if self.with_slot(|s| s.cur.is_null()) {
            let from_global = self.pop_chunk();
            let got = self.with_slot(|s| {
                if from_global.is_null() {
                    // Shared list was empty; fall back to our own push side.
                    s.cur = s.next;
                    s.next = ptr::null_mut();
                } else {
                    s.cur = from_global;
                }
                !s.cur.is_null()
            });
            if !got {
                return None;
            }
        }
        // SAFETY: `cur` is private to this worker while non-null.
        self.with_slot(|s| unsafe { (*s.cur).ring.pop_front() })
    }

    fn is_empty(&self) -> bool {
        let local = self.with_slot(|s| {
            // SAFETY: private chunks of the calling worker.
            unsafe {
                (s.cur.is_null() || (*s.cur).ring.is_empty())
                    && (s.next.is_null() || (*s.next).ring.is_empty())
            }
        });
        local && self.head.value().is_null()
    }

    fn push_initial<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        for item in items {
            self.push(item);
        }
        // Hand the partially filled push chunk to the global list so other
        // workers see seeded work immediately.
        let pending = self.with_slot(|s| {
            let p = s.next;
            s.next = ptr::null_mut();
            p
        });
        if !pending.is_null() {
            self.push_chunk(pending);
        }
    }
}

impl<T: Send, const K: usize> Drop for ChunkedFifo<T, K> {
    fn drop(&mut self) {
        for w in 0..self.slots.len() {
            let (cur, next) = {
                let s = self.slots.get_mut(w).get_mut();
                let pair = (s.cur, s.next);
                s.cur = ptr::null_mut();
                s.next = ptr::null_mut();
                pair
            };
            for chunk in [cur, next] {
                if !chunk.is_null() {
                    // SAFETY: exclusive access; chunk is live.
                    unsafe { self.free_chunk(chunk) };
                }
            }
        }
        let mut chunk = self.head.value();
        while !chunk.is_null() {
            // SAFETY: exclusive access to the global list.
            unsafe {
                let next = (*chunk).next;
                self.free_chunk(chunk);
                chunk = next;
            }
        }
    }
}
