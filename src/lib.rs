//! Client-side connection pool for RESP key-value servers, built on std::net.
//!
//! This crate keeps a bounded set of live sessions to Redis-compatible
//! servers and hands them out to short-lived requests. Transient network
//! failures are absorbed by per-connection retry with reconnect and by a
//! cheap background repair sweep.
//!
//! # Features
//!
//! - Bounded pool of idle and in-use connections with LIFO reuse
//! - Leases that return themselves to the pool on drop
//! - Per-connection failure counting with bounded retry and reconnect
//! - Synchronized connections that can be held across several commands
//! - `AUTH` and `SELECT` on connect, echo `PING`, timeouts and TCP keepalive
//! - Pluggable transports through the [`transport::Connector`] trait
//!
//! # Example
//!
//! ```no_run
//! use respool::{ConnectionPool, PoolConfig, RepairOutcome};
//!
//! let pool = ConnectionPool::new(PoolConfig::default());
//!
//! if let Some(conn) = pool.acquire(("127.0.0.1", 6379)).unwrap() {
//!     conn.execute("SET greeting hello");
//!     if let Some(reply) = conn.execute("GET greeting") {
//!         println!("greeting = {:?}", reply.as_str());
//!     }
//! }
//!
//! // Run periodically, e.g. from a maintenance thread
//! if let RepairOutcome::Degraded { alive, in_use } = pool.repair_sweep() {
//!     eprintln!("{alive}/{in_use} connections alive");
//! }
//! ```
//!
//! # Failure model
//!
//! Only a rejected password is reported as an error
//! ([`PoolError::AuthRejected`]). Other failures are counted and retried:
//! commands return `None`, administrative calls return `false`, and a full
//! pool yields `Ok(None)`.
//!
//! # Wire format
//!
//! Commands are sent as RESP arrays of bulk strings:
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$3\r\nabc\r\n$5\r\nhello\r\n
//! ```

pub mod codec;
pub mod connection;
pub mod error;
pub mod reply;
pub mod transport;
pub mod types;

// Re-export commonly used types at the crate root
pub use connection::{
    ConnectionConfig, ConnectionHandle, ConnectionPool, PoolConfig, PoolStatus, PooledConnection,
    RepairOutcome, RetryPolicy, acquire, repair_sweep,
};
pub use error::{PoolError, Result};
pub use reply::Reply;
pub use types::{ConnectionKey, DEFAULT_PORT, DEFAULT_TIMEOUT, PING_PAYLOAD, ReplyKind};
