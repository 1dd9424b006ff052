//! TCP transport speaking RESP2.

use std::io::{self, BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::BytesMut;
use socket2::{SockRef, TcpKeepalive};

use crate::codec::{encode_command, read_reply};
use crate::connection::KeepAliveConfig;
use crate::error::{PoolError, Result};
use crate::reply::Reply;
use crate::types::ConnectionKey;

use super::{Connector, Transport};

/// A TCP session with RESP framing.
#[derive(Debug)]
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    peer_addr: SocketAddr,
    write_buf: BytesMut,
    keep_alive: KeepAliveConfig,
    closed: bool,
}

impl TcpTransport {
    /// Connect to `key`, trying each resolved address in turn.
    pub fn connect(
        key: &ConnectionKey,
        timeout: Option<Duration>,
        keep_alive: KeepAliveConfig,
    ) -> Result<Self> {
        let addrs = (key.host.as_str(), key.port)
            .to_socket_addrs()
            .map_err(|e| PoolError::InvalidAddress(format!("{key}: {e}")))?;

        let mut last_err = None;
        for addr in addrs {
            let attempt = match timeout {
                Some(t) => TcpStream::connect_timeout(&addr, t),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => return Ok(Self::from_stream(stream, timeout, keep_alive)?),
                Err(e) => last_err = Some(e),
            }
        }

        Err(match last_err {
            Some(e) => PoolError::Io(e),
            None => PoolError::InvalidAddress(format!("{key}: no addresses")),
        })
    }

    /// Create a transport from an existing TcpStream.
    pub fn from_stream(
        stream: TcpStream,
        timeout: Option<Duration>,
        keep_alive: KeepAliveConfig,
    ) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;

        let peer_addr = stream.peer_addr()?;
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        Ok(Self {
            reader,
            writer,
            peer_addr,
            write_buf: BytesMut::with_capacity(256),
            keep_alive,
            closed: false,
        })
    }

    /// Get the peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl Transport for TcpTransport {
    fn execute_argv(&mut self, argv: &[&[u8]]) -> Result<Reply> {
        if self.closed {
            return Err(PoolError::NotConnected);
        }

        self.write_buf.clear();
        encode_command(argv, &mut self.write_buf);
        self.writer.write_all(&self.write_buf)?;
        self.writer.flush()?;

        read_reply(&mut self.reader)
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        if self.closed {
            return Err(PoolError::NotConnected);
        }
        let stream = self.writer.get_ref();
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        Ok(())
    }

    fn enable_keepalive(&mut self) -> Result<()> {
        if self.closed {
            return Err(PoolError::NotConnected);
        }
        let keepalive = TcpKeepalive::new().with_time(self.keep_alive.idle);
        SockRef::from(self.writer.get_ref()).set_tcp_keepalive(&keepalive)?;
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.writer.flush();
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens [`TcpTransport`] sessions.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    keep_alive: KeepAliveConfig,
}

impl TcpConnector {
    /// Create a connector with default keepalive settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the keepalive settings used by `enable_keepalive`.
    pub fn with_keep_alive(mut self, config: KeepAliveConfig) -> Self {
        self.keep_alive = config;
        self
    }
}

impl Connector for TcpConnector {
    fn connect(
        &self,
        key: &ConnectionKey,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn Transport>> {
        let transport = TcpTransport::connect(key, timeout, self.keep_alive.clone())?;
        tracing::trace!(key = %key, peer = %transport.peer_addr(), "tcp session opened");
        Ok(Box::new(transport))
    }
}
