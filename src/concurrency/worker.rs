//! Worker identity.
//!
//! Every pool thread is bound to a worker index before it runs loop code;
//! the index is a thread-local constant for the duration of a call. The
//! thread that owns the [`Runtime`](crate::runtime::Runtime) is worker 0.

use std::cell::Cell;

thread_local! {
    static WORKER: Cell<usize> = const { Cell::new(0) };
}

/// Returns the calling thread's worker index.
///
/// Outside a pool run this is 0, so single-threaded use of the queue
/// family works without a runtime.
#[inline]
pub fn current() -> usize {
    WORKER.with(Cell::get)
}

/// Binds the calling thread to worker index `w`.
pub(crate) fn set_current(w: usize) {
    WORKER.with(|c| c.set(w));
}
