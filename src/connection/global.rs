//! Process-wide pool instance.
//!
//! Most programs should own a [`ConnectionPool`] and pass it around. These
//! functions serve hosts that want one implicit pool per process. The instance
//! is built at most once: after [`shutdown_global`] it is never rebuilt, and
//! the free functions report an empty pool.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::Result;
use crate::types::ConnectionKey;

use super::config::PoolConfig;
use super::pool::{ConnectionPool, PooledConnection, RepairOutcome};

static GLOBAL: Mutex<Option<ConnectionPool>> = parking_lot::const_mutex(None);

/// Number of times the global pool was built or shut down.
static BUILDS: AtomicUsize = AtomicUsize::new(0);

fn get_or_build(config: impl FnOnce() -> PoolConfig) -> (Option<ConnectionPool>, bool) {
    let mut slot = GLOBAL.lock();
    if slot.is_none() && BUILDS.load(Ordering::Acquire) == 0 {
        let config = config();
        tracing::debug!(max_size = config.max_size, "building global connection pool");
        *slot = Some(ConnectionPool::new(config));
        BUILDS.fetch_add(1, Ordering::AcqRel);
        return (slot.clone(), true);
    }
    (slot.clone(), false)
}

/// Get the global pool, building it with default settings on first use.
///
/// Returns `None` once [`shutdown_global`] has run.
pub fn global() -> Option<ConnectionPool> {
    get_or_build(PoolConfig::default).0
}

/// Build the global pool with `config`.
///
/// Returns `false` if it was already built or has been shut down.
pub fn init_global(config: PoolConfig) -> bool {
    get_or_build(|| config).1
}

/// Tear down the global pool, closing every tracked connection.
pub fn shutdown_global() {
    let pool = {
        let mut slot = GLOBAL.lock();
        BUILDS.fetch_add(1, Ordering::AcqRel);
        slot.take()
    };
    if let Some(pool) = pool {
        pool.clear();
        tracing::debug!("global connection pool shut down");
    }
}

/// [`ConnectionPool::acquire`] on the global pool.
///
/// Returns `Ok(None)` when the global pool is full or shut down.
pub fn acquire(key: impl Into<ConnectionKey>) -> Result<Option<PooledConnection>> {
    match global() {
        Some(pool) => pool.acquire(key),
        None => Ok(None),
    }
}

/// [`ConnectionPool::repair_sweep`] on the global pool.
pub fn repair_sweep() -> RepairOutcome {
    match global() {
        Some(pool) => pool.repair_sweep(),
        None => RepairOutcome::Skipped,
    }
}
