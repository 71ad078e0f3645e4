//! The page pool: OS pages with per-worker recycling.
//!
//! Pages are never returned to the OS. A freed page joins the freelist of
//! the worker that first mapped it, so chunk storage that churns through
//! alloc/free keeps touching memory from its own node. The freelist node
//! is stored in the first word of the free page itself.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::alloc::syscall;
use crate::concurrency::{worker, CachePadded, PtrLock, SpinLock};

/// Size of one pool page. Large enough that a huge-page mapping can back
/// it directly on Linux.
pub const PAGE_SIZE: usize = 2 * 1024 * 1024;

struct FreeNode {
    next: *mut FreeNode,
}

/// Coarse-grained page allocator shared by a runtime.
///
/// `alloc_page` consults the calling worker's freelist first and falls
/// back to the OS; `free_page` returns the page to the freelist of the
/// worker that originally mapped it. Only `free_large` ever unmaps.
pub struct PagePool {
    heads: Box<[CachePadded<PtrLock<FreeNode>>]>,
    /// page address -> index of the worker that mapped it. Consulted only
    /// on free, under a coarse lock.
    owners: SpinLock<HashMap<usize, usize>>,
    /// Pages obtained from the OS through `alloc_page`/`prealloc`.
    os_pages: AtomicUsize,
    /// Linux mmap can introduce unbounded sleep; serialize it.
    map_lock: SpinLock<()>,
}

unsafe impl Send for PagePool {}
unsafe impl Sync for PagePool {}

impl PagePool {
    /// Creates a pool with one freelist per worker.
    pub fn new(workers: usize) -> Self {
        assert!(workers > 0);
        Self {
            heads: (0..workers).map(|_| CachePadded::new(PtrLock::new())).collect(),
            owners: SpinLock::new(HashMap::new()),
            os_pages: AtomicUsize::new(0),
            map_lock: SpinLock::new(()),
        }
    }

    fn local_head(&self) -> &PtrLock<FreeNode> {
        let w = worker::current();
        debug_assert!(w < self.heads.len(), "worker id out of range");
        &self.heads[w.min(self.heads.len() - 1)]
    }

    fn map_page_or_die(&self) -> *mut u8 {
        let guard = self.map_lock.lock();
        // SAFETY: PAGE_SIZE is a valid mapping length.
        let ptr = unsafe { syscall::map_region(PAGE_SIZE, true) };
        drop(guard);
        let Some(ptr) = ptr else {
            tracing::error!(bytes = PAGE_SIZE, "out of memory mapping a pool page");
            eprintln!("amorph: out of memory mapping a pool page");
            std::process::abort();
        };
        ptr
    }

    fn alloc_from_os(&self) -> *mut u8 {
        let ptr = self.map_page_or_die();
        let w = worker::current().min(self.heads.len() - 1);
        self.owners.lock().insert(ptr as usize, w);
        self.os_pages.fetch_add(1, Ordering::Relaxed);
        ptr
    }

    /// Allocates one page, preferring the calling worker's freelist.
    pub fn alloc_page(&self) -> NonNull<u8> {
        let head = self.local_head();
        head.lock();
        let node = head.value();
        if !node.is_null() {
            // SAFETY: nodes on the freelist are free pages we own.
            let next = unsafe { (*node).next };
            head.unlock_and_set(next);
            return unsafe { NonNull::new_unchecked(node.cast::<u8>()) };
        }
        head.unlock();
        // SAFETY: alloc_from_os aborts rather than returning null.
        unsafe { NonNull::new_unchecked(self.alloc_from_os()) }
    }

    /// Returns a page to the freelist of the worker that mapped it.
    ///
    /// # Safety
    /// `page` must have come from [`PagePool::alloc_page`] on this pool and
    /// must not be referenced after this call.
    pub unsafe fn free_page(&self, page: NonNull<u8>) {
        let owner = {
            let owners = self.owners.lock();
            *owners
                .get(&(page.as_ptr() as usize))
                .expect("free_page of a pointer the pool never allocated")
        };
        let head = &self.heads[owner];
        let node = page.as_ptr().cast::<FreeNode>();
        head.lock();
        (*node).next = head.value();
        head.unlock_and_set(node);
    }

    /// Maps `n` pages eagerly and parks them on the caller's freelist.
    pub fn prealloc(&self, n: usize) {
        for _ in 0..n {
            let page = self.alloc_from_os();
            // SAFETY: freshly mapped, unreferenced.
            unsafe { self.free_page(NonNull::new_unchecked(page)) };
        }
    }

    /// Number of pages obtained from the OS so far. Freed pages stay in
    /// the pool, so this tracks peak simultaneous use, not traffic.
    pub fn pages_outstanding(&self) -> usize {
        self.os_pages.load(Ordering::Relaxed)
    }

    /// Maps a page-rounded region outside the pool's recycling.
    ///
    /// `prefault` asks for populated page tables up front. Aborts the
    /// process if the OS refuses memory.
    pub fn alloc_large(&self, bytes: usize, prefault: bool) -> NonNull<u8> {
        let size = round_to_pages(bytes);
        let guard = self.map_lock.lock();
        // SAFETY: size is a valid page-rounded mapping length.
        let ptr = unsafe { syscall::map_region(size, prefault) };
        drop(guard);
        let Some(ptr) = ptr else {
            tracing::error!(bytes = size, "out of memory mapping a large region");
            eprintln!("amorph: out of memory mapping a large region");
            std::process::abort();
        };
        // SAFETY: checked non-null above.
        unsafe { NonNull::new_unchecked(ptr) }
    }

    /// Unmaps a region from [`PagePool::alloc_large`]. This is the only
    /// path that returns memory to the OS while the pool is alive.
    ///
    /// # Safety
    /// `ptr`/`bytes` must match a live `alloc_large` allocation.
    pub unsafe fn free_large(&self, ptr: NonNull<u8>, bytes: usize) {
        let size = round_to_pages(bytes);
        let _guard = self.map_lock.lock();
        syscall::unmap_region(ptr.as_ptr(), size);
    }
}

fn round_to_pages(bytes: usize) -> usize {
    (bytes + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

impl Drop for PagePool {
    fn drop(&mut self) {
        // All chunk heaps have returned their pages by now; hand the pool's
        // pages back to the OS.
        let owners = self.owners.get_mut();
        for &page in owners.keys() {
            // SAFETY: every key was mapped by alloc_from_os with PAGE_SIZE.
            unsafe { syscall::unmap_region(page as *mut u8, PAGE_SIZE) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_recycle_through_the_freelist() {
        let pool = PagePool::new(1);
        let a = pool.alloc_page();
        unsafe { pool.free_page(a) };
        let b = pool.alloc_page();
        assert_eq!(a, b, "freed page should be reused before mapping more");
        assert_eq!(pool.pages_outstanding(), 1);
        unsafe { pool.free_page(b) };
    }

    #[test]
    fn prealloc_parks_pages() {
        let pool = PagePool::new(1);
        pool.prealloc(3);
        assert_eq!(pool.pages_outstanding(), 3);
        let a = pool.alloc_page();
        let b = pool.alloc_page();
        assert_eq!(pool.pages_outstanding(), 3);
        unsafe {
            pool.free_page(a);
            pool.free_page(b);
        }
    }

    #[test]
    fn large_regions_round_to_pages() {
        let pool = PagePool::new(1);
        let before = pool.pages_outstanding();
        let r = pool.alloc_large(PAGE_SIZE + 1, false);
        unsafe { pool.free_large(r, PAGE_SIZE + 1) };
        assert_eq!(pool.pages_outstanding(), before);
    }
}
