//! Connection pooling with idle and in-use collections.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::Result;
use crate::transport::{Connector, TcpConnector};
use crate::types::ConnectionKey;

use super::config::{ConnectionConfig, PoolConfig};
use super::handle::ConnectionHandle;
use super::managed::ManagedConnection;
use super::state::FailureCounter;

/// Bookkeeping guarded by the pool lock.
#[derive(Default)]
struct PoolState {
    /// Returned connections, most recent last.
    idle: Vec<ConnectionHandle>,
    /// Connections handed out to callers.
    in_use: Vec<ConnectionHandle>,
    /// Slots held by connections being established.
    reserved: usize,
}

impl PoolState {
    fn occupied(&self) -> usize {
        self.idle.len() + self.in_use.len() + self.reserved
    }

    fn take_from(list: &mut Vec<ConnectionHandle>, handle: &ConnectionHandle) -> bool {
        match list.iter().position(|h| h.same(handle)) {
            Some(pos) => {
                list.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Shared pool state.
struct PoolInner {
    /// Configuration.
    config: PoolConfig,
    /// Opens sessions for new connections.
    connector: Arc<dyn Connector>,
    /// Idle and in-use collections.
    state: Mutex<PoolState>,
    /// Connect failures since the last repair sweep.
    failures: FailureCounter,
    /// Next connection id.
    next_id: AtomicU64,
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Connections waiting to be loaned.
    pub idle: usize,
    /// Connections handed out.
    pub in_use: usize,
    /// Connections being established.
    pub reserved: usize,
    /// Capacity.
    pub max_size: usize,
}

impl PoolStatus {
    /// Fraction of capacity occupied, between 0.0 and 1.0.
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            return 1.0;
        }
        (self.idle + self.in_use + self.reserved) as f64 / self.max_size as f64
    }
}

/// Result of [`ConnectionPool::repair_sweep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// No connect failure was signalled, nothing was done.
    Skipped,
    /// Every in-use connection is healthy.
    Healthy,
    /// Some in-use connections are still failing.
    Degraded {
        /// In-use connections with a zero failure counter.
        alive: usize,
        /// In-use connections in total.
        in_use: usize,
    },
}

impl RepairOutcome {
    /// Check if the sweep left failing connections behind.
    pub fn is_degraded(&self) -> bool {
        matches!(self, RepairOutcome::Degraded { .. })
    }
}

/// A bounded pool of managed connections.
///
/// Connections are either idle (returned, ready to be loaned) or in use
/// (handed out). Together with connections still being established they never
/// exceed `max_size`. Idle connections are reused last-in, first-out.
///
/// The pool lock only guards bookkeeping: connecting, repairing and closing
/// all happen outside it.
///
/// # Example
///
/// ```no_run
/// use respool::{ConnectionPool, PoolConfig};
///
/// let pool = ConnectionPool::new(PoolConfig::default().with_max_size(4));
///
/// if let Some(conn) = pool.acquire(("127.0.0.1", 6379)).unwrap() {
///     conn.execute("SET greeting hello");
/// } // returned to the pool here
///
/// pool.repair_sweep();
/// ```
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create a pool connecting over TCP.
    pub fn new(config: PoolConfig) -> Self {
        Self::with_connector(config, Arc::new(TcpConnector::new()))
    }

    /// Create a pool with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(PoolConfig::default())
    }

    /// Create a pool opening sessions through `connector`.
    pub fn with_connector(config: PoolConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                connector,
                state: Mutex::new(PoolState::default()),
                failures: FailureCounter::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Create and connect a plain connection, marking it in use.
    ///
    /// Returns `Ok(None)` when the pool is full. A connection whose connect
    /// failed transiently is still returned, unconnected, so a repair can
    /// heal it later. Fails only when the server rejects the password.
    pub fn create(
        &self,
        key: impl Into<ConnectionKey>,
        config: ConnectionConfig,
    ) -> Result<Option<ConnectionHandle>> {
        self.create_connection(key.into(), config, false)
    }

    /// Like [`create`](Self::create), but the connection's operations are
    /// serialized by a reentrant lock and the handle supports
    /// [`hold`](ConnectionHandle::hold).
    pub fn create_synchronized(
        &self,
        key: impl Into<ConnectionKey>,
        config: ConnectionConfig,
    ) -> Result<Option<ConnectionHandle>> {
        self.create_connection(key.into(), config, true)
    }

    fn create_connection(
        &self,
        key: ConnectionKey,
        config: ConnectionConfig,
        synchronized: bool,
    ) -> Result<Option<ConnectionHandle>> {
        {
            let mut state = self.inner.state.lock();
            if state.occupied() >= self.inner.config.max_size {
                tracing::warn!(
                    key = %key,
                    max_size = self.inner.config.max_size,
                    "connection pool full"
                );
                return Ok(None);
            }
            state.reserved += 1;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut conn = ManagedConnection::new(
            key,
            config,
            Arc::clone(&self.inner.connector),
            self.inner.failures.clone(),
        );

        let connected = match conn.connect() {
            Ok(connected) => connected,
            Err(e) => {
                self.inner.state.lock().reserved -= 1;
                return Err(e);
            }
        };

        let handle = ConnectionHandle::new(id, conn, synchronized);
        {
            let mut state = self.inner.state.lock();
            state.reserved -= 1;
            state.in_use.push(handle.clone());
        }

        tracing::debug!(
            id,
            key = %handle.key(),
            connected,
            synchronized,
            "connection created"
        );
        Ok(Some(handle))
    }

    /// Loan the most recently returned idle connection for `key`.
    pub fn loan(&self, key: &ConnectionKey) -> Option<ConnectionHandle> {
        let mut state = self.inner.state.lock();
        let pos = state.idle.iter().rposition(|h| h.key() == key)?;
        let handle = state.idle.remove(pos);
        state.in_use.push(handle.clone());
        drop(state);

        tracing::debug!(id = handle.id(), key = %key, "connection loaned");
        Some(handle)
    }

    /// Loan the most recently returned idle connection, whatever its key.
    pub fn loan_any(&self) -> Option<ConnectionHandle> {
        let mut state = self.inner.state.lock();
        let handle = state.idle.pop()?;
        state.in_use.push(handle.clone());
        drop(state);

        tracing::debug!(id = handle.id(), key = %handle.key(), "connection loaned");
        Some(handle)
    }

    /// Move a connection from in use back to idle.
    ///
    /// Returning an idle connection does nothing. A connection the pool no
    /// longer tracks is closed.
    pub fn return_connection(&self, handle: ConnectionHandle) {
        let mut state = self.inner.state.lock();
        if PoolState::take_from(&mut state.in_use, &handle) {
            state.idle.push(handle.clone());
            drop(state);
            tracing::debug!(id = handle.id(), key = %handle.key(), "connection returned");
            return;
        }
        let idle = state.idle.iter().any(|h| h.same(&handle));
        drop(state);

        if !idle {
            tracing::debug!(id = handle.id(), key = %handle.key(), "closing untracked connection");
            handle.close();
        }
    }

    /// Stop tracking a connection and close it for good.
    pub fn close_connection(&self, handle: ConnectionHandle) {
        {
            let mut state = self.inner.state.lock();
            if !PoolState::take_from(&mut state.in_use, &handle) {
                PoolState::take_from(&mut state.idle, &handle);
            }
        }
        handle.revoke();
        handle.close();
        tracing::debug!(id = handle.id(), key = %handle.key(), "connection closed");
    }

    /// Reconnect every in-use connection with a non-zero failure counter.
    ///
    /// Returns whether all in-use connections are healthy afterwards. Idle
    /// connections are left alone.
    pub fn repair_in_use(&self) -> bool {
        let snapshot = self.inner.state.lock().in_use.clone();

        for handle in snapshot.iter().filter(|h| h.link_failures() > 0) {
            if handle.is_revoked() {
                continue;
            }
            tracing::debug!(
                id = handle.id(),
                key = %handle.key(),
                failures = handle.link_failures(),
                "repairing connection"
            );
            if let Err(e) = handle.reconnect() {
                tracing::debug!(id = handle.id(), error = %e, "repair rejected");
            }
        }

        snapshot.iter().all(|h| h.link_failures() == 0)
    }

    /// Number of in-use connections with a zero failure counter.
    pub fn alive_in_use_count(&self) -> usize {
        let state = self.inner.state.lock();
        state.in_use.iter().filter(|h| h.link_failures() == 0).count()
    }

    /// Number of tracked connections, idle and in use.
    pub fn size(&self) -> usize {
        let state = self.inner.state.lock();
        state.idle.len() + state.in_use.len()
    }

    /// Number of idle connections.
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Number of in-use connections.
    pub fn in_use_count(&self) -> usize {
        self.inner.state.lock().in_use.len()
    }

    /// Drop every tracked connection.
    ///
    /// Outstanding handles are revoked: their sessions are closed and later
    /// operations through them fail.
    pub fn clear(&self) {
        let (idle, in_use) = {
            let mut state = self.inner.state.lock();
            (
                std::mem::take(&mut state.idle),
                std::mem::take(&mut state.in_use),
            )
        };

        let cleared = idle.len() + in_use.len();
        for handle in idle.into_iter().chain(in_use) {
            handle.revoke();
            handle.close();
        }
        tracing::debug!(cleared, "connection pool cleared");
    }

    /// Snapshot of pool occupancy.
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            idle: state.idle.len(),
            in_use: state.in_use.len(),
            reserved: state.reserved,
            max_size: self.inner.config.max_size,
        }
    }

    /// Connect failures recorded since the last repair sweep.
    pub fn failure_signal(&self) -> usize {
        self.inner.failures.get()
    }

    /// Get a connection for `key`, reusing an idle one when possible.
    ///
    /// New connections use the pool's default
    /// [`ConnectionConfig`](PoolConfig::connection_config). Returns `Ok(None)`
    /// when the pool is full. The lease returns itself to the pool on drop.
    pub fn acquire(&self, key: impl Into<ConnectionKey>) -> Result<Option<PooledConnection>> {
        let key = key.into();
        if let Some(handle) = self.loan(&key) {
            return Ok(Some(self.lease(handle)));
        }

        let config = self.inner.config.connection_config.clone();
        Ok(self.create(key, config)?.map(|handle| self.lease(handle)))
    }

    fn lease(&self, handle: ConnectionHandle) -> PooledConnection {
        PooledConnection {
            handle,
            pool: Arc::downgrade(&self.inner),
        }
    }

    /// Repair failing in-use connections if any connect failed since the
    /// last sweep.
    ///
    /// Cheap when nothing failed: no lock is taken and no connection touched.
    pub fn repair_sweep(&self) -> RepairOutcome {
        if self.inner.failures.take() == 0 {
            return RepairOutcome::Skipped;
        }

        let healthy = self.repair_in_use();
        if healthy && self.inner.failures.get() == 0 {
            return RepairOutcome::Healthy;
        }

        let (alive, in_use) = {
            let state = self.inner.state.lock();
            let alive = state.in_use.iter().filter(|h| h.link_failures() == 0).count();
            (alive, state.in_use.len())
        };
        tracing::warn!(alive, in_use, "connection pool degraded after repair");
        RepairOutcome::Degraded { alive, in_use }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("ConnectionPool")
            .field("idle", &status.idle)
            .field("in_use", &status.in_use)
            .field("reserved", &status.reserved)
            .field("max_size", &status.max_size)
            .field("failure_signal", &self.failure_signal())
            .finish()
    }
}

/// A leased connection that returns to its pool when dropped.
///
/// If the pool is gone by then, the session is closed instead.
pub struct PooledConnection {
    handle: ConnectionHandle,
    pool: Weak<PoolInner>,
}

impl PooledConnection {
    /// Get the underlying handle.
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let handle = self.handle.clone();
        match self.pool.upgrade() {
            Some(inner) => ConnectionPool { inner }.return_connection(handle),
            None => handle.close(),
        }
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = ConnectionHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("handle", &self.handle)
            .field("pool_alive", &(self.pool.strong_count() > 0))
            .finish()
    }
}
