//! # `amorph`: speculative parallel runtime for irregular workloads
//!
//! A runtime that executes a user-supplied operator over a dynamically
//! evolving collection of work items across many worker threads, with
//! speculative execution, conflict detection and rollback, priority-ordered
//! scheduling, and distributed termination detection.
//!
//! ## Architecture
//!
//! The crate is stratified from leaves upward:
//!
//! 1. **Memory** (`alloc`): an OS-page pool with per-worker freelists, a
//!    fixed-size block heap that carves pages into queue chunks, and a
//!    page-backed bump allocator for per-iteration scratch memory.
//! 2. **Concurrency substrate** (`concurrency`): cache-line padding,
//!    padded spinlocks, pointer locks, and typed per-worker storage.
//! 3. **Worklists** (`concurrency::worklist`): a composable family of
//!    concurrent work-item containers (LIFO, FIFO, chunked FIFO,
//!    priority-bucketed, steal-local, and local/global layerings) behind
//!    one trait so they nest freely.
//! 4. **Runtime** (`runtime`): the `for_each` executor, per-iteration
//!    logical locks with rollback, a NUMA-aware abort-requeue policy, and
//!    a token-ring termination detector.
//!
//! ## Execution model
//!
//! Each iteration runs the operator on one work item. The operator may
//! push new items, allocate scratch memory, acquire logical locks on
//! shared data, or raise a break flag. A failed lock acquisition signals a
//! conflict: the iteration rolls back (locks released, pushes discarded)
//! and the item is requeued through a contention-diffusing abort handler.
//! On success the iteration commits and its pushes become visible work.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use amorph::runtime::{for_each, LoopConfig, Runtime};
//!
//! let rt = Runtime::builder().workers(4).build();
//! let sum = AtomicU64::new(0);
//! for_each(
//!     &rt,
//!     1..=1000u64,
//!     |&x, _ctx| {
//!         sum.fetch_add(x, Ordering::Relaxed);
//!         Ok(())
//!     },
//!     LoopConfig::new().loopname("sum").disable_conflict_detection(),
//! );
//! assert_eq!(sum.load(Ordering::Relaxed), 500_500);
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::inline_always)]

pub mod alloc;
pub mod concurrency;
pub mod runtime;

pub use concurrency::worklist::Worklist;
pub use runtime::{
    for_each, for_each_with, Conflict, IterResult, Lockable, LoopConfig, LoopSummary, Runtime,
    UserContext,
};
