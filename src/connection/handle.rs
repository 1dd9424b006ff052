//! Shared handles to pooled connections.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::error::Result;
use crate::reply::Reply;
use crate::types::ConnectionKey;

use super::managed::ManagedConnection;
use super::state::{ConnectionState, ConnectionStats, FailureCounter};

/// The lock around a connection.
enum Guarded {
    /// Non-reentrant, one operation at a time.
    Plain(Mutex<ManagedConnection>),
    /// Reentrant for the holding thread, see [`ConnectionHandle::hold`].
    Synchronized(ReentrantMutex<RefCell<ManagedConnection>>),
}

struct Slot {
    id: u64,
    key: ConnectionKey,
    failures: FailureCounter,
    /// Shared with the connection so its retry path sees revocation too.
    revoked: Arc<AtomicBool>,
    guarded: Guarded,
}

/// A clonable alias of one pooled connection.
///
/// Every clone refers to the same connection. The pool tracks handles by
/// identity, so returning any clone returns the connection.
///
/// After the pool revokes a connection (see
/// [`ConnectionPool::clear`](super::ConnectionPool::clear)), commands issued
/// through the handle return `None` and administrative operations return
/// `false`.
#[derive(Clone)]
pub struct ConnectionHandle {
    slot: Arc<Slot>,
}

impl ConnectionHandle {
    pub(crate) fn new(id: u64, conn: ManagedConnection, synchronized: bool) -> Self {
        let key = conn.key().clone();
        let failures = conn.failure_counter();
        let revoked = conn.revocation();
        let guarded = if synchronized {
            Guarded::Synchronized(ReentrantMutex::new(RefCell::new(conn)))
        } else {
            Guarded::Plain(Mutex::new(conn))
        };
        Self {
            slot: Arc::new(Slot {
                id,
                key,
                failures,
                revoked,
                guarded,
            }),
        }
    }

    /// Pool-unique connection id.
    pub fn id(&self) -> u64 {
        self.slot.id
    }

    /// Target endpoint.
    pub fn key(&self) -> &ConnectionKey {
        &self.slot.key
    }

    /// Check if this is the synchronized variant.
    pub fn is_synchronized(&self) -> bool {
        matches!(self.slot.guarded, Guarded::Synchronized(_))
    }

    /// Consecutive failures since the last successful connect.
    ///
    /// Never waits on the connection lock.
    pub fn link_failures(&self) -> usize {
        self.slot.failures.get()
    }

    /// Check if the pool has revoked this connection.
    pub fn is_revoked(&self) -> bool {
        self.slot.revoked.load(Ordering::Acquire)
    }

    pub(crate) fn revoke(&self) {
        self.slot.revoked.store(true, Ordering::Release);
    }

    /// Check whether two handles alias the same connection.
    pub fn same(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    fn with<R>(&self, f: impl FnOnce(&mut ManagedConnection) -> R) -> R {
        match &self.slot.guarded {
            Guarded::Plain(mutex) => f(&mut mutex.lock()),
            Guarded::Synchronized(mutex) => {
                let guard = mutex.lock();
                let mut conn = guard.borrow_mut();
                f(&mut conn)
            }
        }
    }

    /// Run a whitespace-separated command. See [`ManagedConnection::execute`].
    pub fn execute(&self, command: &str) -> Option<Reply> {
        if self.is_revoked() {
            return None;
        }
        self.with(|conn| conn.execute(command))
    }

    /// Run a command given as separate arguments.
    pub fn execute_argv(&self, argv: &[&[u8]]) -> Option<Reply> {
        if self.is_revoked() {
            return None;
        }
        self.with(|conn| conn.execute_argv(argv))
    }

    /// Probe liveness. See [`ManagedConnection::ping`].
    pub fn ping(&self) -> bool {
        !self.is_revoked() && self.with(|conn| conn.ping())
    }

    /// Change the I/O timeout.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> bool {
        !self.is_revoked() && self.with(|conn| conn.set_timeout(timeout))
    }

    /// Turn on TCP keepalive probing.
    pub fn enable_keepalive(&self) -> bool {
        !self.is_revoked() && self.with(|conn| conn.enable_keepalive())
    }

    /// Close the session. The connection stays tracked by the pool.
    pub fn close(&self) {
        self.with(|conn| conn.close());
    }

    /// Check if a live session is held.
    pub fn is_connected(&self) -> bool {
        !self.is_revoked() && self.with(|conn| conn.is_connected())
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.with(|conn| conn.state())
    }

    /// Snapshot of the connection statistics.
    pub fn stats(&self) -> ConnectionStats {
        self.with(|conn| conn.stats().clone())
    }

    /// Reconnect unless the connection was revoked while waiting for its lock.
    pub(crate) fn reconnect(&self) -> Result<bool> {
        self.with(|conn| {
            if self.is_revoked() {
                return Ok(false);
            }
            conn.reconnect()
        })
    }

    /// Keep the connection lock for a sequence of operations.
    ///
    /// Only synchronized handles can be held; plain handles return `None`.
    /// While held, other threads block on this connection, and operations on
    /// any clone of this handle from the holding thread proceed normally.
    pub fn hold(&self) -> Option<HeldConnection<'_>> {
        match &self.slot.guarded {
            Guarded::Plain(_) => None,
            Guarded::Synchronized(mutex) => Some(HeldConnection {
                handle: self,
                _guard: mutex.lock(),
            }),
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.slot.id)
            .field("key", &self.slot.key)
            .field("synchronized", &self.is_synchronized())
            .field("failures", &self.link_failures())
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

/// A synchronized connection held by the current thread.
///
/// Derefs to the [`ConnectionHandle`]; the lock is released on drop.
pub struct HeldConnection<'a> {
    handle: &'a ConnectionHandle,
    _guard: ReentrantMutexGuard<'a, RefCell<ManagedConnection>>,
}

impl std::ops::Deref for HeldConnection<'_> {
    type Target = ConnectionHandle;

    fn deref(&self) -> &Self::Target {
        self.handle
    }
}
