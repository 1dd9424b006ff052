//! Transport capability consumed by managed connections.
//!
//! A [`Connector`] opens sessions; a [`Transport`] is one live session. The
//! pool never touches sockets directly, so alternative transports (TLS,
//! in-memory fakes) plug in through these two traits.

pub mod tcp;

pub use tcp::{TcpConnector, TcpTransport};

use std::time::Duration;

use crate::codec::parse_command;
use crate::error::{PoolError, Result};
use crate::reply::Reply;
use crate::types::ConnectionKey;

/// One live request/response session with a server.
pub trait Transport: Send + std::fmt::Debug {
    /// Send a command given as separate arguments and wait for its reply.
    fn execute_argv(&mut self, argv: &[&[u8]]) -> Result<Reply>;

    /// Send a whitespace-separated command and wait for its reply.
    fn execute(&mut self, command: &str) -> Result<Reply> {
        let argv = parse_command(command);
        if argv.is_empty() {
            return Err(PoolError::protocol("empty command"));
        }
        self.execute_argv(&argv)
    }

    /// Set the read and write timeout. `None` blocks indefinitely.
    fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;

    /// Turn on periodic keepalive probing.
    fn enable_keepalive(&mut self) -> Result<()>;

    /// Close the session. Calling it more than once is harmless.
    fn close(&mut self);
}

/// Factory for sessions, injected into the pool.
pub trait Connector: Send + Sync {
    /// Open a session to `key`, bounding connect and I/O by `timeout`.
    fn connect(&self, key: &ConnectionKey, timeout: Option<Duration>)
    -> Result<Box<dyn Transport>>;
}
