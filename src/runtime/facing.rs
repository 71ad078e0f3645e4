//! The per-iteration facade handed to operators.
//!
//! `UserContext` is what an operator sees: a push buffer for new work,
//! scratch allocation, a break request, and logical-lock acquisition.
//! Everything it records is provisional until the iteration commits; an
//! abort discards all of it as if the iteration had never run.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;

use crate::alloc::IterAlloc;
use crate::runtime::context::IterationContext;
use crate::runtime::{IterResult, Lockable};

/// Operator-facing handle for the currently running iteration.
///
/// The lifetime `'g` ties acquired locks to data that outlives the loop
/// call (typically the graph the loop runs over).
pub struct UserContext<'g, T> {
    ctx: RefCell<IterationContext>,
    pushes: RefCell<Vec<T>>,
    alloc: Option<IterAlloc>,
    break_pending: Cell<bool>,
    locks_active: bool,
    pushes_enabled: bool,
    break_enabled: bool,
    _graph: PhantomData<&'g Lockable>,
}

impl<'g, T> UserContext<'g, T> {
    pub(crate) fn new(
        locks_active: bool,
        pushes_enabled: bool,
        break_enabled: bool,
        alloc: Option<IterAlloc>,
    ) -> Self {
        Self {
            ctx: RefCell::new(IterationContext::new()),
            pushes: RefCell::new(Vec::new()),
            alloc,
            break_pending: Cell::new(false),
            locks_active,
            pushes_enabled,
            break_enabled,
            _graph: PhantomData,
        }
    }

    /// Adds a work item, visible to the loop only if this iteration
    /// commits.
    ///
    /// # Panics
    /// Panics if the loop was configured with `no_pushes`.
    pub fn push(&self, item: T) {
        assert!(self.pushes_enabled, "push on a no_pushes loop");
        self.pushes.borrow_mut().push(item);
    }

    /// Scratch memory valid until the end of the current iteration.
    ///
    /// # Panics
    /// Panics unless the loop enabled `per_iter_alloc`.
    pub fn alloc(&self) -> &IterAlloc {
        self.alloc
            .as_ref()
            .expect("scratch allocation requires per_iter_alloc")
    }

    /// Requests that all workers stop after their current iteration. The
    /// request is published when this iteration commits and discarded if
    /// it aborts.
    ///
    /// # Panics
    /// Panics unless the loop enabled `parallel_break`.
    pub fn break_loop(&self) {
        assert!(self.break_enabled, "break_loop without parallel_break");
        self.break_pending.set(true);
    }

    /// Acquires a logical lock for this iteration.
    ///
    /// Succeeds immediately if the lock is unowned or already ours;
    /// conflicts immediately if another running iteration owns it. With
    /// conflict detection disabled (or a single worker) this is a no-op.
    ///
    /// # Errors
    /// [`Conflict`](crate::runtime::Conflict) when the lock is owned by
    /// another active iteration; propagate it with `?`.
    pub fn acquire(&self, lock: &'g Lockable) -> IterResult {
        if !self.locks_active {
            return Ok(());
        }
        self.ctx.borrow_mut().acquire(lock)
    }

    // Executor side: everything below runs between operator invocations,
    // with exclusive access.

    pub(crate) fn start_iteration(&mut self) {
        self.ctx.get_mut().start_iteration();
    }

    pub(crate) fn commit_iteration(&mut self) {
        self.ctx.get_mut().commit_iteration();
    }

    pub(crate) fn cancel_iteration(&mut self) {
        self.ctx.get_mut().cancel_iteration();
        self.pushes.get_mut().clear();
        self.break_pending.set(false);
    }

    /// Drains committed pushes into `sink`, keeping buffer capacity.
    pub(crate) fn drain_pushes(&mut self, mut sink: impl FnMut(T)) -> u64 {
        let pushes = self.pushes.get_mut();
        let n = pushes.len() as u64;
        for item in pushes.drain(..) {
            sink(item);
        }
        n
    }

    pub(crate) fn reset_alloc(&mut self) {
        if let Some(alloc) = self.alloc.as_mut() {
            alloc.reset();
        }
    }

    pub(crate) fn take_break_request(&mut self) -> bool {
        self.break_pending.replace(false)
    }
}
