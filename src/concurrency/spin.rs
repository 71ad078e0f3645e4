//! Spinning locks used throughout the queue family.
//!
//! Two shapes: [`SpinLock`], a padded test-and-set lock guarding a value,
//! and [`PtrLock`], which packs a lock bit into the low bit of a pointer
//! word so a linked-structure head can be locked and swung in one cell.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::concurrency::CachePadded;

/// A test-and-set spinlock guarding a value, padded to its own cache line.
///
/// Hold times in the runtime are a handful of instructions (push/pop on a
/// `Vec` or `VecDeque`), so spinning beats parking.
pub struct SpinLock<T> {
    state: CachePadded<AtomicBool>,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates a new unlocked spinlock.
    pub const fn new(data: T) -> Self {
        Self {
            state: CachePadded::new(AtomicBool::new(false)),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquires the lock, spinning until it is free.
    #[inline]
    pub fn lock(&self) -> SpinGuard<'_, T> {
        while self
            .state
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.state.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
        }
        SpinGuard { lock: self }
    }

    /// Acquires the lock only if it is immediately free.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        if self
            .state
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SpinGuard { lock: self })
        } else {
            None
        }
    }

    /// Returns a mutable reference without locking.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

/// RAII guard for [`SpinLock`]; releases on drop.
pub struct SpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the lock exclusively.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.state.store(false, Ordering::Release);
    }
}

/// A pointer cell whose low bit doubles as a spinlock.
///
/// Pointees must be at least 2-byte aligned so the lock bit is free. The
/// caller pairs `lock` with exactly one of `unlock`, `unlock_and_set`, or
/// holds it across `set_locked` calls.
pub struct PtrLock<T> {
    bits: AtomicUsize,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T> Send for PtrLock<T> {}
unsafe impl<T> Sync for PtrLock<T> {}

const LOCK_BIT: usize = 1;

impl<T> PtrLock<T> {
    /// Creates a new unlocked null pointer cell.
    pub const fn new() -> Self {
        Self {
            bits: AtomicUsize::new(0),
            _marker: PhantomData,
        }
    }

    /// Creates a new unlocked cell holding `ptr`.
    pub fn with(ptr: *mut T) -> Self {
        debug_assert_eq!(ptr as usize & LOCK_BIT, 0);
        Self {
            bits: AtomicUsize::new(ptr as usize),
            _marker: PhantomData,
        }
    }

    /// Spins until the lock bit is acquired.
    #[inline]
    pub fn lock(&self) {
        loop {
            let v = self.bits.load(Ordering::Relaxed);
            if v & LOCK_BIT == 0
                && self
                    .bits
                    .compare_exchange_weak(v, v | LOCK_BIT, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return;
            }
            std::hint::spin_loop();
        }
    }

    /// Releases the lock, keeping the stored pointer.
    #[inline]
    pub fn unlock(&self) {
        let v = self.bits.load(Ordering::Relaxed);
        debug_assert_ne!(v & LOCK_BIT, 0, "unlock of unlocked PtrLock");
        self.bits.store(v & !LOCK_BIT, Ordering::Release);
    }

    /// Releases the lock and installs `ptr` in one store.
    #[inline]
    pub fn unlock_and_set(&self, ptr: *mut T) {
        debug_assert_eq!(ptr as usize & LOCK_BIT, 0);
        debug_assert_ne!(self.bits.load(Ordering::Relaxed) & LOCK_BIT, 0);
        self.bits.store(ptr as usize, Ordering::Release);
    }

    /// Replaces the stored pointer while the lock is held.
    #[inline]
    pub fn set_locked(&self, ptr: *mut T) {
        debug_assert_eq!(ptr as usize & LOCK_BIT, 0);
        debug_assert_ne!(self.bits.load(Ordering::Relaxed) & LOCK_BIT, 0);
        self.bits.store(ptr as usize | LOCK_BIT, Ordering::Relaxed);
    }

    /// Reads the stored pointer without taking the lock.
    #[inline]
    pub fn value(&self) -> *mut T {
        (self.bits.load(Ordering::Acquire) & !LOCK_BIT) as *mut T
    }
}

impl<T> Default for PtrLock<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn spinlock_counts_across_threads() {
        let lock = Arc::new(SpinLock::new(0u64));
        thread::scope(|s| {
            for _ in 0..4 {
                let lock = Arc::clone(&lock);
                s.spawn(move || {
                    for _ in 0..1000 {
                        *lock.lock() += 1;
                    }
                });
            }
        });
        assert_eq!(*lock.lock(), 4000);
    }

    #[test]
    fn ptr_lock_swings_pointer() {
        let mut a = 1u64;
        let mut b = 2u64;
        let cell = PtrLock::with(&mut a);
        cell.lock();
        assert_eq!(cell.value(), std::ptr::addr_of_mut!(a));
        cell.unlock_and_set(&mut b);
        assert_eq!(cell.value(), std::ptr::addr_of_mut!(b));
    }
}
