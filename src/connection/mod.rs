//! Connection management for RESP clients.
//!
//! This module provides:
//! - Managed connections with bounded retry and reconnect
//! - A bounded pool of idle and in-use connections
//! - Configuration for retries, timeouts, and keep-alive
//!
//! # Example
//!
//! ```no_run
//! use respool::connection::{ConnectionConfig, ConnectionPool, PoolConfig, RetryPolicy};
//! use std::time::Duration;
//!
//! let config = PoolConfig::default().with_max_size(8).with_connection_config(
//!     ConnectionConfig::default()
//!         .with_database(2)
//!         .with_retry_policy(RetryPolicy::fixed(3, Duration::from_millis(50))),
//! );
//! let pool = ConnectionPool::new(config);
//!
//! let conn = pool.acquire(("127.0.0.1", 6379)).unwrap().expect("pool full");
//! let reply = conn.execute("GET greeting");
//!
//! // The connection is returned to the pool when dropped
//! drop(conn);
//! ```
//!
//! # Synchronized connections
//!
//! ```no_run
//! use respool::connection::{ConnectionConfig, ConnectionPool};
//!
//! let pool = ConnectionPool::with_defaults();
//! let conn = pool
//!     .create_synchronized(("127.0.0.1", 6379), ConnectionConfig::default())
//!     .unwrap()
//!     .expect("pool full");
//!
//! // No other thread can use the connection while it is held
//! let held = conn.hold().unwrap();
//! held.execute("SET counter 1");
//! held.execute("GET counter");
//! drop(held);
//!
//! pool.return_connection(conn);
//! ```

mod config;
mod global;
mod handle;
mod managed;
#[cfg(test)]
pub(crate) mod mock;
mod pool;
mod state;

pub use config::{BackoffStrategy, ConnectionConfig, KeepAliveConfig, PoolConfig, RetryPolicy};
pub use global::{acquire, global, init_global, repair_sweep, shutdown_global};
pub use handle::{ConnectionHandle, HeldConnection};
pub use managed::ManagedConnection;
pub use pool::{ConnectionPool, PoolStatus, PooledConnection, RepairOutcome};
pub use state::{ConnectionState, ConnectionStats, FailureCounter};
