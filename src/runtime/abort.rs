//! Abort handling: requeueing conflicted items under a contention
//! diffusing policy.
//!
//! Conflicts cluster on hot data. The first abort retries locally, which
//! is cheap when few iterations touch the item; sustained conflict walks
//! the item toward socket leaders and then across sockets in a binary
//! tree, so the contending parties stop meeting on the same cache lines.

use std::sync::Arc;

use crate::concurrency::worklist::{SharedChunkedFifo, Worklist};
use crate::concurrency::{worker, PerWorker};
use crate::runtime::{Runtime, TokenRing, Topology};

/// A work item plus the number of times it has been queued for retry.
#[derive(Clone, Debug)]
pub struct Aborted<T> {
    /// The conflicted work item.
    pub item: T,
    /// Retry count; 1 on the first abort, incremented on each requeue.
    pub retries: u32,
}

/// Requeue placement policy for re-aborted items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortPolicy {
    /// Always requeue on the local worker.
    Eager,
    /// Diffuse straight down the socket tree: requeue at the leader of
    /// socket `current / 2`.
    Basic,
    /// Alternate local retries with halving steps toward the socket
    /// leader, then diffuse over sockets.
    Double,
    /// Local below 2 retries, halving toward the leader below 5, then
    /// diffuse over sockets.
    Bounded,
}

/// Where one requeue should land.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Target {
    Local,
    Remote(usize),
}

/// Pure placement function; `retries` is the count already stamped on the
/// requeued item (≥ 2, since first aborts always go local).
pub(crate) fn diffusion_target(
    topo: &Topology,
    w: usize,
    retries: u32,
    policy: AbortPolicy,
) -> Target {
    let over_sockets = |topo: &Topology, w: usize| {
        Target::Remote(topo.leader_of_socket(topo.socket_of(w) / 2))
    };
    let toward_leader = |topo: &Topology, w: usize| {
        let leader = topo.leader_of(w);
        Target::Remote(leader + (w - leader) / 2)
    };
    match policy {
        AbortPolicy::Eager => Target::Local,
        AbortPolicy::Basic => over_sockets(topo, w),
        AbortPolicy::Double => {
            if (retries - 1) & 1 == 1 {
                Target::Local
            } else if topo.is_leader(w) {
                over_sockets(topo, w)
            } else {
                toward_leader(topo, w)
            }
        }
        AbortPolicy::Bounded => {
            let r = retries - 1;
            if r < 2 {
                Target::Local
            } else if r < 5 && !topo.is_leader(w) {
                toward_leader(topo, w)
            } else {
                over_sockets(topo, w)
            }
        }
    }
}

/// Per-worker requeue channels with a diffusion policy between them.
pub struct AbortHandler<T: Send> {
    queues: PerWorker<SharedChunkedFifo<Aborted<T>>>,
    topo: Topology,
    policy: AbortPolicy,
}

impl<T: Send> AbortHandler<T> {
    /// Creates the handler with the machine-appropriate default policy:
    /// basic on machines with more than two sockets, double otherwise.
    pub fn new(rt: &Runtime) -> Self {
        let policy = if rt.topology().sockets() > 2 {
            AbortPolicy::Basic
        } else {
            AbortPolicy::Double
        };
        Self::with_policy(rt, policy)
    }

    /// Creates the handler with an explicit policy.
    pub fn with_policy(rt: &Runtime, policy: AbortPolicy) -> Self {
        let pool = rt.pages();
        Self {
            queues: PerWorker::new(rt.workers(), |_| {
                SharedChunkedFifo::with_pool(Arc::clone(pool))
            }),
            topo: rt.topology().clone(),
            policy,
        }
    }

    /// The policy in force.
    pub fn policy(&self) -> AbortPolicy {
        self.policy
    }

    /// Queues a first-time abort locally with a retry count of 1.
    pub fn push(&self, item: T) {
        self.queues.local().push(Aborted { item, retries: 1 });
    }

    /// Requeues a re-aborted item under the diffusion policy, tainting the
    /// receiving worker's termination state on remote placement.
    pub fn requeue(&self, prev: Aborted<T>, ring: &TokenRing) {
        let next = Aborted {
            item: prev.item,
            retries: prev.retries + 1,
        };
        let w = worker::current();
        match diffusion_target(&self.topo, w, next.retries, self.policy) {
            Target::Local => self.queues.local().push(next),
            Target::Remote(to) if to == w => self.queues.local().push(next),
            Target::Remote(to) => {
                self.queues.remote(to).push(next);
                ring.taint(to);
            }
        }
    }

    /// The calling worker's requeue channel, drained by the worker loop.
    pub fn local_queue(&self) -> &SharedChunkedFifo<Aborted<T>> {
        self.queues.local()
    }

    /// True when no worker has pending aborted items.
    pub fn all_empty(&self) -> bool {
        self.queues.iter().all(Worklist::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_sockets() -> Topology {
        Topology::uniform(8, 4)
    }

    #[test]
    fn basic_reaches_socket_zero_within_log_sockets() {
        // An item repeatedly aborted anywhere must land on socket 0's
        // leader within ceil(log2(sockets)) hops.
        let topo = four_sockets();
        let mut at = 7;
        let mut hops = 0;
        loop {
            match diffusion_target(&topo, at, 2 + hops, AbortPolicy::Basic) {
                Target::Remote(next) => {
                    hops += 1;
                    at = next;
                }
                Target::Local => unreachable!("basic always names a target"),
            }
            if at == topo.leader_of_socket(0) {
                break;
            }
            assert!(hops <= 2, "diffusion too slow");
        }
        assert!(hops <= 2);
    }

    #[test]
    fn double_alternates_local_and_tree_steps() {
        let topo = four_sockets();
        // First requeue (stamped retries 2) stays local.
        assert_eq!(
            diffusion_target(&topo, 7, 2, AbortPolicy::Double),
            Target::Local
        );
        // Second requeue halves the distance to the socket leader.
        assert_eq!(
            diffusion_target(&topo, 7, 3, AbortPolicy::Double),
            Target::Remote(6)
        );
        // A leader diffuses across sockets.
        assert_eq!(
            diffusion_target(&topo, 6, 3, AbortPolicy::Double),
            Target::Remote(topo.leader_of_socket(1))
        );
    }

    #[test]
    fn bounded_escalates_with_retries() {
        let topo = four_sockets();
        assert_eq!(
            diffusion_target(&topo, 7, 2, AbortPolicy::Bounded),
            Target::Local
        );
        assert_eq!(
            diffusion_target(&topo, 7, 4, AbortPolicy::Bounded),
            Target::Remote(6)
        );
        assert_eq!(
            diffusion_target(&topo, 7, 7, AbortPolicy::Bounded),
            Target::Remote(topo.leader_of_socket(1))
        );
    }
}
