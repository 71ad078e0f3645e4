//! Logical locks and the per-iteration context.
//!
//! A [`Lockable`] is a one-word ownership cell embedded in user data
//! (graph nodes, edges). Acquisition is non-blocking: immediately yours if
//! unowned, an immediate [`Conflict`] if another running iteration owns
//! it, a no-op if you already do. The iteration context records what was
//! acquired so commit and cancel can release everything.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Signal that the current iteration lost a lock race and must abort.
///
/// Carries no data; operators propagate it with `?` and the worker loop
/// rolls the iteration back and requeues the item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Conflict;

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("iteration conflicted on a logical lock")
    }
}

impl std::error::Error for Conflict {}

/// Result of one operator invocation.
pub type IterResult = Result<(), Conflict>;

const UNOWNED: usize = 0;

/// A one-word logical lock, owned by at most one iteration context.
///
/// Embed one per protected element and acquire it through
/// [`UserContext::acquire`](crate::runtime::UserContext::acquire).
#[derive(Debug)]
pub struct Lockable {
    owner: AtomicUsize,
}

impl Lockable {
    /// Creates an unowned lock.
    pub const fn new() -> Self {
        Self {
            owner: AtomicUsize::new(UNOWNED),
        }
    }

    fn try_acquire(&self, ctx: usize) -> Result<bool, Conflict> {
        debug_assert_ne!(ctx, UNOWNED);
        match self
            .owner
            .compare_exchange(UNOWNED, ctx, Ordering::Acquire, Ordering::Relaxed)
        {
            Ok(_) => Ok(true),
            Err(cur) if cur == ctx => Ok(false),
            Err(_) => Err(Conflict),
        }
    }

    fn release(&self) {
        self.owner.store(UNOWNED, Ordering::Release);
    }

    /// True while some iteration owns the lock. Racy; for diagnostics.
    pub fn is_owned(&self) -> bool {
        self.owner.load(Ordering::Relaxed) != UNOWNED
    }
}

impl Default for Lockable {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock bookkeeping for the iteration currently running on a worker.
///
/// The context's own address is the ownership word, so contexts must stay
/// pinned while an iteration is active (they live in worker-local state
/// for the duration of a loop call).
pub(crate) struct IterationContext {
    held: Vec<*const Lockable>,
}

impl IterationContext {
    pub(crate) fn new() -> Self {
        Self { held: Vec::new() }
    }

    fn id(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }

    pub(crate) fn start_iteration(&mut self) {
        debug_assert!(self.held.is_empty(), "locks leaked across iterations");
    }

    /// Takes `lock` for this context, recording it for release.
    pub(crate) fn acquire(&mut self, lock: &Lockable) -> IterResult {
        if lock.try_acquire(self.id())? {
            self.held.push(std::ptr::from_ref(lock));
        }
        Ok(())
    }

    fn release_all(&mut self) {
        for lock in self.held.drain(..).rev() {
            // SAFETY: pointees outlive the loop call (enforced by the
            // `'g` bound on `UserContext::acquire`) and were acquired by
            // this context.
            unsafe { (*lock).release() };
        }
    }

    /// Ends the iteration successfully; all acquired locks are released.
    pub(crate) fn commit_iteration(&mut self) {
        self.release_all();
    }

    /// Rolls the iteration back; all acquired locks are released.
    pub(crate) fn cancel_iteration(&mut self) {
        self.release_all();
    }
}

impl Drop for IterationContext {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reacquire_by_owner_is_a_noop() {
        let lock = Lockable::new();
        let mut ctx = IterationContext::new();
        ctx.start_iteration();
        assert_eq!(ctx.acquire(&lock), Ok(()));
        assert_eq!(ctx.acquire(&lock), Ok(()));
        assert_eq!(ctx.held.len(), 1);
        ctx.commit_iteration();
        assert!(!lock.is_owned());
    }

    #[test]
    fn foreign_owner_conflicts_until_release() {
        let lock = Lockable::new();
        let mut a = IterationContext::new();
        let mut b = IterationContext::new();
        a.start_iteration();
        b.start_iteration();
        assert_eq!(a.acquire(&lock), Ok(()));
        assert_eq!(b.acquire(&lock), Err(Conflict));
        a.cancel_iteration();
        assert_eq!(b.acquire(&lock), Ok(()));
        b.commit_iteration();
    }

    #[test]
    fn cancel_releases_everything() {
        let locks: Vec<Lockable> = (0..4).map(|_| Lockable::new()).collect();
        let mut ctx = IterationContext::new();
        ctx.start_iteration();
        for l in &locks {
            ctx.acquire(l).unwrap();
        }
        ctx.cancel_iteration();
        assert!(locks.iter().all(|l| !l.is_owned()));
    }
}
