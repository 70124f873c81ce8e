//! Bounded cache of [`Connection`]s shared by every caller of a database.
//!
//! The pool is the unit of concurrency: a connection serves one caller at
//! a time, so parallel operations check out distinct connections. Checkout
//! hands out a [`PooledConnection`] guard which returns the connection on
//! drop; connections that are dead, still waiting on a reply or past
//! `max_usage` are evicted instead of cached.
mod registry;

pub use registry::*;


use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::timeout_at;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::Connection;
use crate::Connector;
use crate::Error;
use crate::NetworkConfig;
use crate::PoolConfig;
use crate::Result;
use crate::TcpConnector;

/// Point-in-time counters of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Checked-out connections
    pub active: usize,
    /// Connections cached for reuse
    pub idle: usize,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<Connection>,
    active: usize,
    /// Idle connections taken out by `warm_up` while they connect
    warming: usize,
}

struct PoolInner {
    config: PoolConfig,
    network: NetworkConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<PoolState>,
    /// Signalled whenever a slot is given back
    released: Notify,
    next_id: AtomicU64,
}

/// Cheap to clone; clones share the same connections
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("stats", &self.stats())
            .field("max_connections", &self.inner.config.max_connections)
            .finish()
    }
}

impl ConnectionPool {
    /// Creates a pool dialing through tokio TCP sockets.
    ///
    /// # Errors
    /// - [`Error::Config`] if either config fails validation
    pub fn new(
        config: PoolConfig,
        network: NetworkConfig,
    ) -> Result<Self> {
        let connector = Arc::new(TcpConnector::new(&network));
        Self::with_connector(config, network, connector)
    }

    /// Creates a pool over an injected [`Connector`]. `min_cached`
    /// connections are built immediately but open no socket until used or
    /// [`warm_up`](Self::warm_up) runs.
    pub fn with_connector(
        config: PoolConfig,
        network: NetworkConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        config.validate()?;
        network.validate()?;

        let pool = Self {
            inner: Arc::new(PoolInner {
                config,
                network,
                connector,
                state: Mutex::new(PoolState::default()),
                released: Notify::new(),
                next_id: AtomicU64::new(1),
            }),
        };
        let cached: Vec<Connection> = (0..pool.inner.config.min_cached)
            .map(|_| pool.new_connection())
            .collect();
        pool.inner.state.lock().idle = cached;
        Ok(pool)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            active: state.active,
            idle: state.idle.len() + state.warming,
        }
    }

    fn new_connection(&self) -> Connection {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        Connection::new(
            id,
            &self.inner.config,
            &self.inner.network,
            self.inner.connector.clone(),
        )
    }

    /// Checks a connection out without waiting. Cached connections whose
    /// socket the peer closed are evicted on the way.
    ///
    /// # Errors
    /// - [`Error::TooManyConnections`] if `max_connections` are checked out
    pub fn acquire(&self) -> Result<PooledConnection> {
        let max = self.inner.config.max_connections;
        let mut state = self.inner.state.lock();
        if max > 0 && state.active >= max {
            return Err(Error::TooManyConnections { max });
        }
        let conn = loop {
            match state.idle.pop() {
                Some(mut conn) => {
                    conn.detect_peer_close();
                    if conn.is_reusable() {
                        break conn;
                    }
                    debug!(connection = conn.id(), "evicting idle connection closed by peer");
                }
                None => break self.new_connection(),
            }
        };
        state.active += 1;
        trace!(connection = conn.id(), active = state.active, idle = state.idle.len(), "acquire");

        Ok(PooledConnection {
            conn: Some(conn),
            pool: self.clone(),
        })
    }

    /// Like [`acquire`](Self::acquire) but waits up to `wait` for a
    /// connection to be released.
    ///
    /// # Errors
    /// - [`Error::TooManyConnections`] if none was released in time
    pub async fn acquire_timeout(
        &self,
        wait: Duration,
    ) -> Result<PooledConnection> {
        let deadline = Instant::now() + wait;
        loop {
            let released = self.inner.released.notified();
            match self.acquire() {
                Err(Error::TooManyConnections { .. }) => {}
                other => return other,
            }
            if timeout_at(deadline, released).await.is_err() {
                return self.acquire();
            }
        }
    }

    /// Returns a checked-out connection; called by [`PooledConnection`] on
    /// drop.
    fn release(
        &self,
        mut conn: Connection,
    ) {
        let config = &self.inner.config;
        let mut state = self.inner.state.lock();
        state.active = state.active.saturating_sub(1);

        if config.max_usage > 0 && conn.usage_count() > config.max_usage {
            debug!(connection = conn.id(), usage = conn.usage_count(), "retiring connection past max_usage");
            conn.close();
        } else if !conn.is_reusable() {
            debug!(connection = conn.id(), "evicting dead connection");
            conn.close();
        } else if config.max_cached == 0 || state.idle.len() < config.max_cached {
            trace!(connection = conn.id(), "caching connection");
            state.idle.push(conn);
        } else {
            trace!(connection = conn.id(), "idle cache full, closing connection");
            conn.close();
        }
        drop(state);
        self.inner.released.notify_one();
    }

    /// Closes every idle connection. Checked-out connections are untouched
    /// and still return to the pool when dropped.
    pub fn close_all(&self) {
        let idle = std::mem::take(&mut self.inner.state.lock().idle);
        debug!(closed = idle.len(), "closing idle connections");
        for mut conn in idle {
            conn.close();
        }
    }

    /// Connects every idle connection that has no socket yet.
    ///
    /// Connections being warmed still count as idle and do not hold a
    /// checkout slot, so `acquire` meanwhile hands out fresh connections.
    ///
    /// # Errors
    /// Returns the first connect error; connections that failed are
    /// dropped, the others stay cached.
    pub async fn warm_up(&self) -> Result<()> {
        let mut cold = {
            let mut state = self.inner.state.lock();
            let (cold, warm): (Vec<_>, Vec<_>) = state.idle.drain(..).partition(|c| !c.is_alive());
            state.idle = warm;
            state.warming += cold.len();
            cold
        };
        if cold.is_empty() {
            return Ok(());
        }

        let results = join_all(cold.iter_mut().map(|conn| conn.connect())).await;

        let mut first_error = None;
        let mut state = self.inner.state.lock();
        state.warming -= cold.len();
        for (conn, result) in cold.into_iter().zip(results) {
            match result {
                Ok(()) => state.idle.push(conn),
                Err(e) => {
                    warn!(connection = conn.id(), error = %e, "warm-up connect failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        drop(state);
        self.inner.released.notify_waiters();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// A checked-out [`Connection`]; goes back to its pool on drop
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: ConnectionPool,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_tuple("PooledConnection").field(&self.conn).finish()
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `Drop` takes the connection out
        self.conn.as_ref().unwrap_or_else(|| unreachable!("connection already released"))
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!("connection already released"))
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
