//! RESP2 framing and codec utilities.
//!
//! Commands are always sent as arrays of bulk strings:
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n
//! ```
//!
//! Replies start with a type byte (`+`, `-`, `:`, `$`, `*`) and end with CRLF.

use std::io::{BufRead, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PoolError, Result};
use crate::reply::Reply;
use crate::types::ReplyKind;

const CRLF: &[u8] = b"\r\n";

/// Largest bulk string accepted from a server (512 MiB, the RESP limit).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Deepest array nesting accepted from a server.
pub const MAX_NESTING: usize = 32;

/// Split a formatted command into whitespace-separated arguments.
///
/// `"SET key value"` becomes `[b"SET", b"key", b"value"]`. Arguments that
/// contain whitespace must be sent through the argv form instead.
pub fn parse_command(command: &str) -> Vec<&[u8]> {
    command.split_whitespace().map(str::as_bytes).collect()
}

/// Encode a command as a RESP array of bulk strings, appending to `buf`.
pub fn encode_command(args: &[&[u8]], buf: &mut BytesMut) {
    let payload: usize = args.iter().map(|a| a.len() + 16).sum();
    buf.reserve(16 + payload);

    put_header(buf, b'*', args.len() as i64);
    for arg in args {
        put_header(buf, b'$', arg.len() as i64);
        buf.put_slice(arg);
        buf.put_slice(CRLF);
    }
}

/// Encode a reply, appending to `buf`.
pub fn encode_reply(reply: &Reply, buf: &mut BytesMut) {
    match reply {
        Reply::Status(s) => {
            buf.put_u8(b'+');
            buf.put_slice(s.as_bytes());
            buf.put_slice(CRLF);
        }
        Reply::Error(s) => {
            buf.put_u8(b'-');
            buf.put_slice(s.as_bytes());
            buf.put_slice(CRLF);
        }
        Reply::Integer(n) => put_header(buf, b':', *n),
        Reply::Bulk(data) => {
            put_header(buf, b'$', data.len() as i64);
            buf.put_slice(data);
            buf.put_slice(CRLF);
        }
        Reply::Array(items) => {
            put_header(buf, b'*', items.len() as i64);
            for item in items {
                encode_reply(item, buf);
            }
        }
        Reply::Nil => put_header(buf, b'$', -1),
    }
}

fn put_header(buf: &mut BytesMut, prefix: u8, value: i64) {
    buf.put_u8(prefix);
    buf.put_slice(value.to_string().as_bytes());
    buf.put_slice(CRLF);
}

/// Write a complete reply to a stream.
pub fn write_reply<W: Write>(writer: &mut W, reply: &Reply) -> Result<()> {
    let mut buf = BytesMut::new();
    encode_reply(reply, &mut buf);
    writer.write_all(&buf)?;
    Ok(())
}

/// Read a complete reply from a buffered stream.
///
/// Returns [`PoolError::ConnectionClosed`] if the stream ends before the
/// first byte of the reply.
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<Reply> {
    read_nested(reader, 0)
}

fn read_nested<R: BufRead>(reader: &mut R, depth: usize) -> Result<Reply> {
    if depth > MAX_NESTING {
        return Err(PoolError::protocol("array nesting too deep"));
    }

    let line = read_line(reader)?;
    let (&type_byte, body) = line
        .split_first()
        .ok_or_else(|| PoolError::protocol("empty reply line"))?;

    let kind = ReplyKind::from_type_byte(type_byte).ok_or_else(|| {
        PoolError::protocol(format!("unknown reply type byte 0x{type_byte:02X}"))
    })?;

    match kind {
        ReplyKind::Status => Ok(Reply::Status(utf8(body)?)),
        ReplyKind::Error => Ok(Reply::Error(utf8(body)?)),
        ReplyKind::Integer => Ok(Reply::Integer(parse_int(body)?)),
        ReplyKind::Bulk => {
            let len = parse_int(body)?;
            if len < 0 {
                return Ok(Reply::Nil);
            }
            let len = len as usize;
            if len > MAX_BULK_LEN {
                return Err(PoolError::protocol(format!(
                    "bulk length {len} exceeds maximum of {MAX_BULK_LEN}"
                )));
            }

            let mut data = vec![0u8; len + CRLF.len()];
            reader.read_exact(&mut data)?;
            if !data.ends_with(CRLF) {
                return Err(PoolError::protocol("bulk string not terminated by CRLF"));
            }
            data.truncate(len);
            Ok(Reply::Bulk(Bytes::from(data)))
        }
        ReplyKind::Array => {
            let count = parse_int(body)?;
            if count < 0 {
                return Ok(Reply::Nil);
            }
            let mut items = Vec::with_capacity((count as usize).min(1024));
            for _ in 0..count {
                items.push(read_nested(reader, depth + 1)?);
            }
            Ok(Reply::Array(items))
        }
        ReplyKind::Nil => Err(PoolError::protocol("nil has no type byte")),
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<Vec<u8>> {
    let mut line = Vec::with_capacity(64);
    if reader.read_until(b'\n', &mut line)? == 0 {
        return Err(PoolError::ConnectionClosed);
    }
    if !line.ends_with(CRLF) {
        return Err(PoolError::protocol("line not terminated by CRLF"));
    }
    line.truncate(line.len() - CRLF.len());
    Ok(line)
}

fn utf8(body: &[u8]) -> Result<String> {
    String::from_utf8(body.to_vec()).map_err(|_| PoolError::protocol("reply line is not UTF-8"))
}

fn parse_int(body: &[u8]) -> Result<i64> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| PoolError::protocol("invalid integer in reply"))
}
