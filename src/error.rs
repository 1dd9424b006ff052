//! Error types for pool and connection operations.

use std::io;
use thiserror::Error;

use crate::types::ConnectionKey;

/// Errors that can occur while talking to a RESP server.
///
/// Only [`PoolError::AuthRejected`] ever escapes the pool API. Every other
/// variant is a transient failure that the managed connection counts and
/// retries.
#[derive(Error, Debug)]
pub enum PoolError {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The server sent a frame that is not valid RESP.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection closed by the peer.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No live session is available.
    #[error("Not connected")]
    NotConnected,

    /// The connection key did not resolve to a socket address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The server refused the configured credential.
    #[error("Authentication rejected by {key}: {reason}")]
    AuthRejected {
        /// Endpoint that refused the credential.
        key: ConnectionKey,
        /// Reply text returned by the server.
        reason: String,
    },
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

impl PoolError {
    /// Create a new protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Check if this error is a configuration failure that retrying cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }

    /// Check if this error is recoverable (transient).
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }
}
