//! Token-ring termination detection.
//!
//! Each worker carries a colour; doing work turns it black, as does
//! receiving a requeued item from another worker. A token circulates over
//! worker indices, blackened by any black worker it passes. When worker 0
//! receives a white token after having sent one (two clean phases), the
//! ring declares global quiescence.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::concurrency::{worker, CachePadded, PerWorker};

struct TokenState {
    has_token: AtomicBool,
    token_black: AtomicBool,
    process_black: AtomicBool,
    /// Only worker 0 reads or writes this.
    last_was_white: AtomicBool,
}

/// Distributed quiescence detector over the worker ring.
pub struct TokenRing {
    states: PerWorker<TokenState>,
    global_term: CachePadded<AtomicBool>,
}

impl TokenRing {
    /// Creates the ring for `workers` participants.
    pub fn new(workers: usize) -> Self {
        Self {
            states: PerWorker::new(workers, |_| TokenState {
                has_token: AtomicBool::new(false),
                token_black: AtomicBool::new(false),
                process_black: AtomicBool::new(true),
                last_was_white: AtomicBool::new(false),
            }),
            global_term: CachePadded::new(AtomicBool::new(false)),
        }
    }

    /// Resets the calling worker's state for a fresh detection round.
    /// Worker 0 re-arms the ring and re-issues the token.
    pub fn initialize_thread(&self) {
        let st = self.states.local();
        st.token_black.store(false, Ordering::Relaxed);
        st.process_black.store(true, Ordering::Relaxed);
        if worker::current() == 0 {
            st.last_was_white.store(true, Ordering::Relaxed);
            st.has_token.store(true, Ordering::Relaxed);
            self.global_term.store(false, Ordering::Release);
        } else {
            st.has_token.store(false, Ordering::Relaxed);
        }
    }

    /// Records whether the calling worker performed work since the last
    /// call, and forwards the token if this worker holds it.
    pub fn signal_worked(&self, did_work: bool) {
        let me = worker::current();
        let st = self.states.local();
        if did_work {
            st.process_black.store(true, Ordering::Relaxed);
        }
        if !st.has_token.load(Ordering::Acquire) {
            return;
        }
        if me == 0 {
            let failed =
                st.token_black.load(Ordering::Relaxed) || st.process_black.load(Ordering::Relaxed);
            st.token_black.store(false, Ordering::Relaxed);
            st.process_black.store(false, Ordering::Relaxed);
            if st.last_was_white.load(Ordering::Relaxed) && !failed {
                self.global_term.store(true, Ordering::Release);
                return;
            }
            st.last_was_white.store(!failed, Ordering::Relaxed);
            st.has_token.store(false, Ordering::Relaxed);
            self.forward_token(me, false);
        } else {
            let taint =
                st.token_black.load(Ordering::Relaxed) || st.process_black.load(Ordering::Relaxed);
            st.token_black.store(false, Ordering::Relaxed);
            st.process_black.store(false, Ordering::Relaxed);
            st.has_token.store(false, Ordering::Relaxed);
            self.forward_token(me, taint);
        }
    }

    fn forward_token(&self, from: usize, black: bool) {
        let next = self.states.remote((from + 1) % self.states.len());
        next.token_black.store(black, Ordering::Relaxed);
        next.has_token.store(true, Ordering::Release);
    }

    /// False once global quiescence has been declared.
    pub fn working(&self) -> bool {
        !self.global_term.load(Ordering::Acquire)
    }

    /// Blackens worker `w` after a remote push made work appear in its
    /// queues without `w` having done anything.
    pub fn taint(&self, w: usize) {
        self.states.remote(w).process_black.store(true, Ordering::Release);
    }
}
