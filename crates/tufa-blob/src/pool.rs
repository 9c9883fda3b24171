//! Data connection pool
//!
//! Bounded per-server pools of [`DataClient`]s. Clients are handed out
//! exclusively: [`DataClientPool::acquire`] moves a client out of the pool
//! and [`DataClientPool::release`] / [`DataClientPool::release_with_error`]
//! move it back in.
//!
//! ```text
//! DataClientPool
//!   registry (pool-wide lock)
//!     "blob-1:26259" -> ServerPool { idle: [c3, c1], live: 3, closed }
//!     "blob-2:26259" -> ServerPool { idle: [],       live: 8, closed }  <- acquirers wait
//! ```
//!
//! Idle clients are reused LIFO so the most recently used (warmest)
//! connection goes out first.

use crate::data::{DataClient, DataOptions};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use tufa_common::config::{ClientConfig, DEFAULT_POOL_SIZE};

/// Snapshot of one server's pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerPoolStats {
    /// Clients waiting in the idle stack
    pub idle: usize,
    /// Clients created and not yet discarded (idle + in use)
    pub live: usize,
}

/// Pool of data connections keyed by server address.
///
/// Safe for concurrent use from any number of threads.
pub struct DataClientPool {
    pool_size: usize,
    options: DataOptions,
    registry: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    pools: HashMap<String, Arc<ServerPool>>,
    closed: bool,
}

struct ServerPool {
    addr: String,
    pool_size: usize,
    options: DataOptions,
    state: Mutex<ServerPoolState>,
    available: Condvar,
}

struct ServerPoolState {
    /// LIFO stack of idle clients
    idle: Vec<DataClient>,
    live: usize,
    closed: bool,
}

impl DataClientPool {
    /// Create a pool allowing `pool_size` connections per server.
    /// Zero falls back to the default of 8.
    pub fn new(pool_size: usize) -> Self {
        Self::with_options(pool_size, DataOptions::default())
    }

    /// Create a pool whose clients use `options`
    pub fn with_options(pool_size: usize, options: DataOptions) -> Self {
        let pool_size = if pool_size == 0 {
            DEFAULT_POOL_SIZE
        } else {
            pool_size
        };
        Self {
            pool_size,
            options,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Create a pool from client configuration
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_options(config.pool.effective_size(), DataOptions::from(&config.data))
    }

    /// Maximum connections per server
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Take a client for `addr`, blocking while the server is at capacity.
    ///
    /// Returns `None` once the pool is closed, including when the close
    /// happens while waiting.
    pub fn acquire(&self, addr: &str) -> Option<DataClient> {
        let server = {
            let mut registry = self.registry.lock();
            if registry.closed {
                return None;
            }
            let server = registry.pools.entry(addr.to_string()).or_insert_with(|| {
                debug!(addr, pool_size = self.pool_size, "creating server pool");
                Arc::new(ServerPool::new(addr, self.pool_size, self.options.clone()))
            });
            Arc::clone(server)
        };
        server.acquire()
    }

    /// Return a healthy client for reuse
    pub fn release(&self, client: DataClient) {
        match self.server(client.addr()) {
            Some(server) => server.release(client),
            None => drop(client),
        }
    }

    /// Return a client whose last operation failed. Its connection is
    /// closed and its capacity slot freed for a fresh connection.
    pub fn release_with_error(&self, mut client: DataClient) {
        client.close();
        if let Some(server) = self.server(client.addr()) {
            server.release_with_error();
        }
    }

    /// Close every idle connection and wake all waiters. Idempotent.
    pub fn close(&self) {
        let pools = {
            let mut registry = self.registry.lock();
            if registry.closed {
                return;
            }
            registry.closed = true;
            std::mem::take(&mut registry.pools)
        };
        debug!(servers = pools.len(), "closing data client pool");
        for server in pools.values() {
            server.close();
        }
    }

    /// Current idle/live counts for `addr`
    #[must_use]
    pub fn stats(&self, addr: &str) -> Option<ServerPoolStats> {
        self.server(addr).map(|server| server.stats())
    }

    fn server(&self, addr: &str) -> Option<Arc<ServerPool>> {
        self.registry.lock().pools.get(addr).cloned()
    }
}

impl Default for DataClientPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

impl Drop for DataClientPool {
    fn drop(&mut self) {
        self.close();
    }
}

impl ServerPool {
    fn new(addr: &str, pool_size: usize, options: DataOptions) -> Self {
        Self {
            addr: addr.to_string(),
            pool_size,
            options,
            state: Mutex::new(ServerPoolState {
                idle: Vec::with_capacity(pool_size),
                live: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    fn acquire(&self) -> Option<DataClient> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(client) = state.idle.pop() {
                return Some(client);
            }
            if state.live < self.pool_size {
                state.live += 1;
                debug!(addr = %self.addr, live = state.live, "growing server pool");
                return Some(DataClient::with_options(self.addr.clone(), self.options.clone()));
            }
            self.available.wait(&mut state);
        }
    }

    fn release(&self, client: DataClient) {
        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            drop(client);
            return;
        }
        state.idle.push(client);
        self.available.notify_one();
    }

    fn release_with_error(&self) {
        let mut state = self.state.lock();
        state.live = state.live.saturating_sub(1);
        debug!(addr = %self.addr, live = state.live, "discarded failed connection");
        self.available.notify_one();
    }

    fn close(&self) {
        let idle = {
            let mut state = self.state.lock();
            state.closed = true;
            self.available.notify_all();
            std::mem::take(&mut state.idle)
        };
        drop(idle);
    }

    fn stats(&self) -> ServerPoolStats {
        let state = self.state.lock();
        ServerPoolStats {
            idle: state.idle.len(),
            live: state.live,
        }
    }
}
