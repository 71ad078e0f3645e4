//! The execution runtime: worker pool, logical locks, abort diffusion,
//! termination detection, and the `for_each` executor.

mod abort;
mod config;
mod context;
mod facing;
mod for_each;
mod pool;
mod stats;
mod termination;
mod topology;

pub use abort::{AbortHandler, AbortPolicy, Aborted};
pub use config::{ConfigError, LoopConfig};
pub use context::{Conflict, IterResult, Lockable};
pub use facing::UserContext;
pub use for_each::{for_each, for_each_with};
pub use pool::{Runtime, RuntimeBuilder};
pub use stats::{LoopStats, LoopSummary};
pub use termination::TokenRing;
pub use topology::Topology;
