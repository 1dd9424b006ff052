//! In-memory connector for unit tests.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{PoolError, Result};
use crate::reply::Reply;
use crate::transport::{Connector, Transport};
use crate::types::ConnectionKey;

/// Shared, scriptable server behaviour.
#[derive(Debug, Default)]
pub(crate) struct MockServer {
    /// Refuse every connect attempt.
    pub refuse_connects: AtomicBool,
    /// Sleep before answering a connect attempt.
    pub connect_delay: Mutex<Duration>,
    /// Fail every data command (anything but AUTH and SELECT).
    pub fail_commands: AtomicBool,
    /// Fail the next N data commands.
    pub fail_next: AtomicUsize,
    /// Sleep before reporting a failed data command.
    pub failure_delay: Mutex<Duration>,
    /// Fail the next N set_timeout / enable_keepalive calls.
    pub fail_admin_next: AtomicUsize,
    /// Answer SELECT with an error.
    pub reject_select: AtomicBool,
    /// Password expected by AUTH.
    pub password: Mutex<Option<String>>,
    /// Connect attempts seen.
    pub connects: AtomicUsize,
    /// Commands seen, including failed ones.
    pub commands: AtomicUsize,
    store: Mutex<HashMap<Vec<u8>, Bytes>>,
}

impl MockServer {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn dispatch(&self, argv: &[&[u8]]) -> Reply {
        let name = String::from_utf8_lossy(argv[0]).to_ascii_uppercase();
        match (name.as_str(), &argv[1..]) {
            ("AUTH", [pw]) => match &*self.password.lock() {
                Some(expected) if expected.as_bytes() == *pw => Reply::status("OK"),
                Some(_) => Reply::Error("WRONGPASS invalid password".into()),
                None => Reply::Error("ERR AUTH called without any password configured".into()),
            },
            ("SELECT", [_]) if self.reject_select.load(Ordering::SeqCst) => {
                Reply::Error("ERR DB index is out of range".into())
            }
            ("SELECT", [_]) => Reply::status("OK"),
            ("PING", []) => Reply::status("PONG"),
            ("PING", [payload]) => Reply::bulk(payload.to_vec()),
            ("SET", [k, v]) => {
                self.store.lock().insert(k.to_vec(), Bytes::copy_from_slice(v));
                Reply::status("OK")
            }
            ("GET", [k]) => match self.store.lock().get(*k) {
                Some(v) => Reply::Bulk(v.clone()),
                None => Reply::Nil,
            },
            ("DEL", keys) => {
                let mut store = self.store.lock();
                let removed = keys.iter().filter(|k| store.remove(**k).is_some()).count();
                Reply::Integer(removed as i64)
            }
            _ => Reply::Error(format!("ERR unknown command '{name}'")),
        }
    }
}

/// Connector handing out [`MockTransport`] sessions bound to one [`MockServer`].
#[derive(Debug, Clone, Default)]
pub(crate) struct MockConnector {
    server: Arc<MockServer>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(self, password: &str) -> Self {
        *self.server.password.lock() = Some(password.to_string());
        self
    }

    pub fn server(&self) -> &Arc<MockServer> {
        &self.server
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        _key: &ConnectionKey,
        _timeout: Option<Duration>,
    ) -> Result<Box<dyn Transport>> {
        self.server.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.server.connect_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if self.server.refuse_connects.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into());
        }
        Ok(Box::new(MockTransport {
            server: Arc::clone(&self.server),
            closed: false,
        }))
    }
}

/// One session against a [`MockServer`].
#[derive(Debug)]
pub(crate) struct MockTransport {
    server: Arc<MockServer>,
    closed: bool,
}

impl Transport for MockTransport {
    fn execute_argv(&mut self, argv: &[&[u8]]) -> Result<Reply> {
        if self.closed {
            return Err(PoolError::NotConnected);
        }
        if argv.is_empty() {
            return Err(PoolError::protocol("empty command"));
        }
        self.server.commands.fetch_add(1, Ordering::SeqCst);

        let handshake = argv[0].eq_ignore_ascii_case(b"AUTH")
            || argv[0].eq_ignore_ascii_case(b"SELECT");
        let fails = !handshake
            && (self.server.fail_commands.load(Ordering::SeqCst)
                || MockServer::take_one(&self.server.fail_next));
        if fails {
            let delay = *self.server.failure_delay.lock();
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out").into());
        }

        Ok(self.server.dispatch(argv))
    }

    fn set_timeout(&mut self, _timeout: Option<Duration>) -> Result<()> {
        self.admin()
    }

    fn enable_keepalive(&mut self) -> Result<()> {
        self.admin()
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

impl MockTransport {
    fn admin(&mut self) -> Result<()> {
        if self.closed {
            return Err(PoolError::NotConnected);
        }
        if MockServer::take_one(&self.server.fail_admin_next) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe").into());
        }
        Ok(())
    }
}
