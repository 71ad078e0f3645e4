//! Concurrency substrate: padding, spinlocks, worker identity, and typed
//! per-worker storage.

pub mod cache_padded;
pub mod per_worker;
pub mod spin;
pub mod worker;
pub mod worklist;

pub use cache_padded::CachePadded;
pub use per_worker::PerWorker;
pub use spin::{PtrLock, SpinLock};
