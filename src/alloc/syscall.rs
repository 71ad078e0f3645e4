//! Raw OS mappings backing the page pool.
//!
//! On unix, regions come from anonymous `mmap`, attempted in order:
//! huge-page-backed, populate-on-map, ordinary. The first mapping that
//! succeeds wins. Elsewhere the global allocator stands in behind the same
//! interface.

#[cfg(unix)]
mod unix {
    use libc::{
        c_void, mmap, munmap, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE,
    };
    use std::ptr;

    const PROT: i32 = PROT_READ | PROT_WRITE;
    const MAP_BASE: i32 = MAP_ANONYMOUS | MAP_PRIVATE;

    #[cfg(target_os = "linux")]
    const MAP_POP: i32 = libc::MAP_POPULATE | MAP_BASE;
    #[cfg(target_os = "linux")]
    const MAP_HUGE: i32 = libc::MAP_HUGETLB | MAP_POP;

    unsafe fn try_map(size: usize, flags: i32) -> Option<*mut u8> {
        let ptr = mmap(ptr::null_mut(), size, PROT, flags, -1, 0);
        if ptr == MAP_FAILED || ptr.is_null() {
            None
        } else {
            Some(ptr.cast::<u8>())
        }
    }

    /// Maps `size` bytes of zeroed anonymous memory.
    ///
    /// `prefault` asks the kernel to populate page tables up front; it is a
    /// hint and silently degrades where unsupported.
    pub unsafe fn map_region(size: usize, prefault: bool) -> Option<*mut u8> {
        #[cfg(target_os = "linux")]
        {
            if let Some(p) = try_map(size, MAP_HUGE) {
                return Some(p);
            }
            if prefault {
                if let Some(p) = try_map(size, MAP_POP) {
                    return Some(p);
                }
            }
        }
        let _ = prefault;
        try_map(size, MAP_BASE)
    }

    /// Unmaps a region previously returned by [`map_region`].
    pub unsafe fn unmap_region(ptr: *mut u8, size: usize) {
        munmap(ptr.cast::<c_void>(), size);
    }
}

#[cfg(not(unix))]
mod fallback {
    use std::alloc::{alloc_zeroed, dealloc, Layout};

    use crate::alloc::PAGE_SIZE;

    fn layout_for(size: usize) -> Layout {
        Layout::from_size_align(size, PAGE_SIZE).expect("bad region size")
    }

    pub unsafe fn map_region(size: usize, _prefault: bool) -> Option<*mut u8> {
        let ptr = alloc_zeroed(layout_for(size));
        if ptr.is_null() {
            None
        } else {
            Some(ptr)
        }
    }

    pub unsafe fn unmap_region(ptr: *mut u8, size: usize) {
        dealloc(ptr, layout_for(size));
    }
}

#[cfg(unix)]
pub(crate) use unix::{map_region, unmap_region};

#[cfg(not(unix))]
pub(crate) use fallback::{map_region, unmap_region};
