//! Structured server replies.

use bytes::Bytes;

use crate::types::ReplyKind;

/// A decoded RESP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple status string, e.g. `OK`.
    Status(String),
    /// Binary-safe bulk string.
    Bulk(Bytes),
    /// Integer reply.
    Integer(i64),
    /// Error string returned by the server.
    Error(String),
    /// Array of nested replies.
    Array(Vec<Reply>),
    /// Null bulk string or null array.
    Nil,
}

impl Reply {
    /// Create a bulk reply from anything convertible into bytes.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Self::Bulk(data.into())
    }

    /// Create a status reply.
    pub fn status(text: impl Into<String>) -> Self {
        Self::Status(text.into())
    }

    /// Get the kind of this reply.
    pub fn kind(&self) -> ReplyKind {
        match self {
            Reply::Status(_) => ReplyKind::Status,
            Reply::Bulk(_) => ReplyKind::Bulk,
            Reply::Integer(_) => ReplyKind::Integer,
            Reply::Error(_) => ReplyKind::Error,
            Reply::Array(_) => ReplyKind::Array,
            Reply::Nil => ReplyKind::Nil,
        }
    }

    /// Check if this is the status reply `OK`.
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Status(s) if s == "OK")
    }

    /// Check if this is an error reply.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Check if this is a nil reply.
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    /// Get the raw bytes of a status, bulk or error reply.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Status(s) | Reply::Error(s) => Some(s.as_bytes()),
            Reply::Bulk(b) => Some(b.as_ref()),
            _ => None,
        }
    }

    /// Get a status, bulk or error reply as UTF-8 text.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Get an integer reply.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the elements of an array reply.
    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(items) => Some(items),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_accessors() {
        assert!(Reply::status("OK").is_ok());
        assert!(!Reply::status("QUEUED").is_ok());
        assert!(!Reply::bulk("OK").is_ok());

        let bulk = Reply::bulk(b"hello".as_slice());
        assert_eq!(bulk.kind(), ReplyKind::Bulk);
        assert_eq!(bulk.as_str(), Some("hello"));
        assert_eq!(bulk.as_integer(), None);

        assert_eq!(Reply::Integer(7).as_integer(), Some(7));
        assert!(Reply::Error("ERR".into()).is_error());
        assert!(Reply::Nil.is_nil());
        assert_eq!(Reply::Nil.as_bytes(), None);
    }

    #[test]
    fn test_array_accessor() {
        let reply = Reply::Array(vec![Reply::Integer(1), Reply::Nil]);
        assert_eq!(reply.kind(), ReplyKind::Array);
        assert_eq!(reply.as_array().map(|a| a.len()), Some(2));
    }
}
