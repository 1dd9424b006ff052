//! Core types and constants.

use std::time::Duration;

/// Default TCP port of a RESP server.
pub const DEFAULT_PORT: u16 = 6379;

/// Default I/O timeout applied to new connections.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Payload sent with `PING`; a live server echoes it back unchanged.
pub const PING_PAYLOAD: &str = "hello, u there";

/// Identifies the remote endpoint a connection targets.
///
/// Keys are not unique: the pool may hold several connections with the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ConnectionKey {
    /// Create a key for the given host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Create a key for the given host on [`DEFAULT_PORT`].
    pub fn with_default_port(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_PORT)
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<(&str, u16)> for ConnectionKey {
    fn from((host, port): (&str, u16)) -> Self {
        Self::new(host, port)
    }
}

impl From<(String, u16)> for ConnectionKey {
    fn from((host, port): (String, u16)) -> Self {
        Self::new(host, port)
    }
}

/// Kind of a RESP reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    /// Simple status string (`+OK`).
    Status,
    /// Bulk string.
    Bulk,
    /// Signed 64-bit integer.
    Integer,
    /// Error string (`-ERR ...`).
    Error,
    /// Array of nested replies.
    Array,
    /// Null bulk string or null array.
    Nil,
}

impl ReplyKind {
    /// Create a ReplyKind from its RESP type byte.
    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            b'+' => Some(Self::Status),
            b'$' => Some(Self::Bulk),
            b':' => Some(Self::Integer),
            b'-' => Some(Self::Error),
            b'*' => Some(Self::Array),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReplyKind::Status => "status",
            ReplyKind::Bulk => "bulk",
            ReplyKind::Integer => "integer",
            ReplyKind::Error => "error",
            ReplyKind::Array => "array",
            ReplyKind::Nil => "nil",
        };
        f.write_str(name)
    }
}
