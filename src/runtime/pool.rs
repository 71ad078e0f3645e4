//! The runtime handle and its worker pool.
//!
//! A [`Runtime`] fixes the worker count, the socket layout, and the page
//! pool up front; nothing in the engine initializes lazily. Loop calls
//! spawn one scoped thread per worker beyond the caller, who participates
//! as worker 0.

use std::sync::Arc;

use crate::alloc::PagePool;
use crate::concurrency::worker;
use crate::runtime::config::ConfigError;
use crate::runtime::Topology;

/// Shared handle to the engine's fixed resources.
pub struct Runtime {
    topo: Topology,
    pages: Arc<PagePool>,
}

impl Runtime {
    /// A runtime with one worker per available CPU on a single socket.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts configuring a runtime.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Number of workers; fixed for the life of the runtime.
    pub fn workers(&self) -> usize {
        self.topo.workers()
    }

    /// The socket layout.
    pub fn topology(&self) -> &Topology {
        &self.topo
    }

    /// The page pool backing chunk and scratch storage.
    pub fn pages(&self) -> &Arc<PagePool> {
        &self.pages
    }

    /// Runs `f(worker)` on every worker concurrently and waits for all of
    /// them. The calling thread is worker 0.
    pub(crate) fn run<F>(&self, f: F)
    where
        F: Fn(usize) + Sync,
    {
        let n = self.workers();
        if n == 1 {
            worker::set_current(0);
            f(0);
            return;
        }
        std::thread::scope(|s| {
            for w in 1..n {
                let f = &f;
                std::thread::Builder::new()
                    .name(format!("amorph-worker-{w}"))
                    .spawn_scoped(s, move || {
                        worker::set_current(w);
                        f(w);
                    })
                    .expect("failed to spawn worker thread");
            }
            worker::set_current(0);
            f(0);
        });
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    workers: Option<usize>,
    sockets: Option<usize>,
    prealloc_pages: usize,
}

impl RuntimeBuilder {
    /// Sets the worker count. Defaults to the number of CPUs.
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = Some(n);
        self
    }

    /// Sets the socket count for abort diffusion. Defaults to one; tests
    /// use this to simulate multi-socket machines.
    pub fn sockets(mut self, n: usize) -> Self {
        self.sockets = Some(n);
        self
    }

    /// Maps `n` pages eagerly at build time.
    pub fn prealloc_pages(mut self, n: usize) -> Self {
        self.prealloc_pages = n;
        self
    }

    /// Builds the runtime, validating the configuration.
    ///
    /// # Errors
    /// See [`ConfigError`].
    pub fn try_build(self) -> Result<Runtime, ConfigError> {
        let workers = self.workers.unwrap_or_else(num_cpus::get).max(1);
        let sockets = self.sockets.unwrap_or(1);
        if sockets == 0 || sockets > workers {
            return Err(ConfigError::BadSocketCount { sockets, workers });
        }
        let pages = Arc::new(PagePool::new(workers));
        if self.prealloc_pages > 0 {
            pages.prealloc(self.prealloc_pages);
        }
        tracing::debug!(workers, sockets, "runtime constructed");
        Ok(Runtime {
            topo: Topology::uniform(workers, sockets),
            pages,
        })
    }

    /// Builds the runtime, panicking on configuration errors.
    pub fn build(self) -> Runtime {
        self.try_build().expect("invalid runtime configuration")
    }
}
