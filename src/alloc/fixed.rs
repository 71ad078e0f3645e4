//! Fixed-size block heap carved out of pool pages.
//!
//! Queue chunks are the only client: every block has the same size, so a
//! freed block can be handed straight back out without fitting logic.
//! Pages borrowed from the [`PagePool`] are returned when the heap drops.

use std::ptr::NonNull;
use std::sync::Arc;

use crate::alloc::{PagePool, PAGE_SIZE};
use crate::concurrency::SpinLock;

struct HeapState {
    free: Vec<*mut u8>,
    pages: Vec<NonNull<u8>>,
}

/// Allocator for equal-sized blocks backed by pool pages.
pub struct FixedSizeHeap {
    pool: Arc<PagePool>,
    stride: usize,
    state: SpinLock<HeapState>,
}

unsafe impl Send for FixedSizeHeap {}
unsafe impl Sync for FixedSizeHeap {}

impl FixedSizeHeap {
    /// Creates a heap for blocks of `size` bytes at `align` alignment.
    ///
    /// # Panics
    /// Panics if a block would not fit in one page or `align` is not a
    /// power of two.
    pub fn new(pool: Arc<PagePool>, size: usize, align: usize) -> Self {
        assert!(align.is_power_of_two());
        let stride = size.max(align).next_multiple_of(align).max(1);
        assert!(stride <= PAGE_SIZE, "block larger than a pool page");
        Self {
            pool,
            stride,
            state: SpinLock::new(HeapState {
                free: Vec::new(),
                pages: Vec::new(),
            }),
        }
    }

    /// Convenience constructor sized for a `T`.
    pub fn for_type<T>(pool: Arc<PagePool>) -> Self {
        Self::new(pool, std::mem::size_of::<T>(), std::mem::align_of::<T>())
    }

    /// Hands out one uninitialized block.
    pub fn alloc_block(&self) -> NonNull<u8> {
        {
            let mut state = self.state.lock();
            if let Some(p) = state.free.pop() {
                // SAFETY: only non-null carved pointers enter `free`.
                return unsafe { NonNull::new_unchecked(p) };
            }
        }
        let page = self.pool.alloc_page();
        let blocks = PAGE_SIZE / self.stride;
        debug_assert!(blocks >= 1);
        let mut state = self.state.lock();
        state.pages.push(page);
        for i in 1..blocks {
            // SAFETY: i * stride stays inside the page.
            state.free.push(unsafe { page.as_ptr().add(i * self.stride) });
        }
        page
    }

    /// Takes a block back.
    ///
    /// # Safety
    /// `block` must have come from [`FixedSizeHeap::alloc_block`] on this
    /// heap and must no longer be referenced.
    pub unsafe fn free_block(&self, block: NonNull<u8>) {
        self.state.lock().free.push(block.as_ptr());
    }

    /// The rounded per-block stride in bytes.
    pub fn block_size(&self) -> usize {
        self.stride
    }
}

impl Drop for FixedSizeHeap {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for page in state.pages.drain(..) {
            // SAFETY: each entry was borrowed from the pool by alloc_block.
            unsafe { self.pool.free_page(page) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_come_from_one_page_until_exhausted() {
        let pool = Arc::new(PagePool::new(1));
        let heap = FixedSizeHeap::new(Arc::clone(&pool), 512, 128);
        let per_page = PAGE_SIZE / heap.block_size();
        let blocks: Vec<_> = (0..per_page).map(|_| heap.alloc_block()).collect();
        assert_eq!(pool.pages_outstanding(), 1);
        for b in blocks {
            unsafe { heap.free_block(b) };
        }
        let _again = heap.alloc_block();
        assert_eq!(pool.pages_outstanding(), 1);
    }
}
