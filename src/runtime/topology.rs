//! Machine topology as the runtime sees it.
//!
//! Workers are grouped into sockets; the lowest-indexed worker of a socket
//! is its leader and serves as the rendezvous point of the abort-diffusion
//! policies. The grouping is configured, not probed, so tests can simulate
//! multi-socket machines.

/// Socket layout over a fixed set of worker indices.
#[derive(Clone, Debug)]
pub struct Topology {
    /// Socket index per worker.
    socket_of: Vec<usize>,
    /// Leader worker per socket.
    leaders: Vec<usize>,
}

impl Topology {
    /// Distributes `workers` contiguously over `sockets`.
    ///
    /// # Panics
    /// Panics if either count is zero or there are more sockets than
    /// workers.
    pub fn uniform(workers: usize, sockets: usize) -> Self {
        assert!(workers > 0 && sockets > 0 && sockets <= workers);
        let per = workers.div_ceil(sockets);
        let socket_of: Vec<usize> = (0..workers).map(|w| (w / per).min(sockets - 1)).collect();
        let mut leaders = vec![usize::MAX; sockets];
        for (w, &s) in socket_of.iter().enumerate() {
            if leaders[s] == usize::MAX {
                leaders[s] = w;
            }
        }
        Self { socket_of, leaders }
    }

    /// All workers on one socket.
    pub fn single_socket(workers: usize) -> Self {
        Self::uniform(workers, 1)
    }

    /// Number of workers.
    pub fn workers(&self) -> usize {
        self.socket_of.len()
    }

    /// Number of sockets.
    pub fn sockets(&self) -> usize {
        self.leaders.len()
    }

    /// Socket of worker `w`.
    pub fn socket_of(&self, w: usize) -> usize {
        self.socket_of[w]
    }

    /// Leader worker of socket `s`.
    pub fn leader_of_socket(&self, s: usize) -> usize {
        self.leaders[s]
    }

    /// Leader of worker `w`'s socket.
    pub fn leader_of(&self, w: usize) -> usize {
        self.leaders[self.socket_of[w]]
    }

    /// True if `w` leads its socket.
    pub fn is_leader(&self, w: usize) -> bool {
        self.leader_of(w) == w
    }
}
