//! Managed connection with bounded retry and reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::codec::parse_command;
use crate::error::{PoolError, Result};
use crate::reply::Reply;
use crate::transport::{Connector, Transport};
use crate::types::{ConnectionKey, PING_PAYLOAD};

use super::config::ConnectionConfig;
use super::state::{ConnectionState, ConnectionStats, FailureCounter};

/// A single server session with failure accounting and automatic repair.
///
/// Instances are built by [`ConnectionPool`](super::ConnectionPool) and reached
/// through a [`ConnectionHandle`](super::ConnectionHandle). The wrapped session
/// is replaced wholesale whenever the connection reconnects.
///
/// Transient failures are never raised: they increment the failure counter
/// and show up as `None` or `false` results. The only error surfaced is
/// [`PoolError::AuthRejected`], after which the connection stays unusable.
pub struct ManagedConnection {
    /// Target endpoint.
    key: ConnectionKey,
    /// Connection configuration.
    config: ConnectionConfig,
    /// Opens new sessions.
    connector: Arc<dyn Connector>,
    /// Live session, if any.
    transport: Option<Box<dyn Transport>>,
    /// Current connection state.
    state: ConnectionState,
    /// Consecutive failures since the last successful connect.
    failures: FailureCounter,
    /// Pool-wide count of failed connects.
    pool_failures: FailureCounter,
    /// Reply text of a rejected AUTH.
    rejection: Option<String>,
    /// Set once the pool stops tracking this connection.
    revoked: Arc<AtomicBool>,
    /// Connection statistics.
    stats: ConnectionStats,
}

impl ManagedConnection {
    /// Create an unconnected instance.
    pub(crate) fn new(
        key: ConnectionKey,
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        pool_failures: FailureCounter,
    ) -> Self {
        Self {
            key,
            config,
            connector,
            transport: None,
            state: ConnectionState::Disconnected,
            failures: FailureCounter::new(),
            pool_failures,
            rejection: None,
            revoked: Arc::new(AtomicBool::new(false)),
            stats: ConnectionStats::default(),
        }
    }

    /// Get the target endpoint.
    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Get the connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Get connection statistics.
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Check if a live session is held.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Consecutive failures since the last successful connect.
    pub fn link_failures(&self) -> usize {
        self.failures.get()
    }

    pub(crate) fn failure_counter(&self) -> FailureCounter {
        self.failures.clone()
    }

    pub(crate) fn revocation(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.revoked)
    }

    fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }

    /// Establish the session if there is none.
    ///
    /// Returns `Ok(true)` when connected and `Ok(false)` after a transient
    /// failure, which is counted locally and in the pool failure signal.
    /// Returns an error only when the server rejects the password.
    pub fn connect(&mut self) -> Result<bool> {
        if self.transport.is_some() {
            return Ok(true);
        }
        if self.is_revoked() {
            return Ok(false);
        }
        if self.state.is_failed() {
            return Err(self.auth_error());
        }

        let mut transport = match self.connector.connect(&self.key, self.config.timeout) {
            Ok(transport) => transport,
            Err(e) => {
                self.record_connect_failure(&e);
                return Ok(false);
            }
        };

        if let Some(password) = &self.config.password {
            match transport.execute_argv(&[b"AUTH", password.as_bytes()]) {
                Ok(reply) if reply.is_ok() => {}
                Ok(reply) => {
                    transport.close();
                    let reason = reply
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("unexpected {} reply", reply.kind()));
                    tracing::error!(key = %self.key, reason = %reason, "authentication rejected");
                    self.rejection = Some(reason);
                    self.state = ConnectionState::Failed;
                    return Err(self.auth_error());
                }
                Err(e) => {
                    transport.close();
                    self.record_connect_failure(&e);
                    return Ok(false);
                }
            }
        }

        let database = self.config.database.to_string();
        match transport.execute_argv(&[b"SELECT", database.as_bytes()]) {
            Ok(reply) if reply.is_ok() => {}
            Ok(reply) => {
                transport.close();
                self.failures.increment();
                self.pool_failures.increment();
                self.stats.record_connect_failure();
                tracing::warn!(
                    key = %self.key,
                    database = self.config.database,
                    reply = ?reply,
                    "select database failed"
                );
                return Ok(false);
            }
            Err(e) => {
                transport.close();
                self.record_connect_failure(&e);
                return Ok(false);
            }
        }

        self.transport = Some(transport);
        self.state = ConnectionState::Connected;
        self.failures.reset();
        self.stats.record_connect();
        tracing::debug!(key = %self.key, database = self.config.database, "connected");
        Ok(true)
    }

    /// Close the current session and open a new one.
    pub fn reconnect(&mut self) -> Result<bool> {
        self.close();
        self.stats.record_reconnect();
        tracing::debug!(key = %self.key, failures = self.failures.get(), "reconnecting");
        self.connect()
    }

    /// Close the session. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            self.stats.record_disconnect();
        }
        if !self.state.is_failed() {
            self.state = ConnectionState::Disconnected;
        }
    }

    /// Run a whitespace-separated command, retrying with reconnects.
    ///
    /// `None` means the command failed; it is never an empty success.
    pub fn execute(&mut self, command: &str) -> Option<Reply> {
        let argv = parse_command(command);
        self.execute_argv(&argv)
    }

    /// Run a command given as separate arguments, retrying with reconnects.
    ///
    /// Returns `None` immediately when unconnected. Otherwise every failed
    /// attempt bumps the failure counter, and up to `retry_policy.max_retries`
    /// times the session is rebuilt and the command issued again.
    pub fn execute_argv(&mut self, argv: &[&[u8]]) -> Option<Reply> {
        if argv.is_empty() || self.transport.is_none() {
            return None;
        }

        let mut attempt = 0;
        loop {
            let result = match self.transport.as_mut() {
                Some(transport) => {
                    let result = transport.execute_argv(argv);
                    self.stats.record_command(result.is_ok());
                    result
                }
                None => Err(PoolError::NotConnected),
            };

            match result {
                Ok(reply) => return Some(reply),
                Err(e) => {
                    let failures = self.failures.increment();
                    tracing::trace!(
                        key = %self.key,
                        attempt,
                        failures,
                        error = %e,
                        "command failed"
                    );
                }
            }

            if !self.config.retry_policy.should_retry(attempt) {
                tracing::debug!(key = %self.key, attempts = attempt + 1, "command abandoned");
                return None;
            }

            let delay = self.config.retry_policy.delay_for_attempt(attempt);
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            attempt += 1;

            if self.is_revoked() {
                tracing::debug!(key = %self.key, "connection revoked, retry abandoned");
                return None;
            }
            if let Err(e) = self.reconnect() {
                tracing::error!(key = %self.key, error = %e, "reconnect during retry rejected");
                return None;
            }
        }
    }

    /// Probe liveness with an echo `PING`.
    pub fn ping(&mut self) -> bool {
        self.with_single_retry("ping", |transport| {
            let reply = transport.execute_argv(&[b"PING", PING_PAYLOAD.as_bytes()])?;
            if reply.as_bytes() == Some(PING_PAYLOAD.as_bytes()) {
                Ok(())
            } else {
                Err(PoolError::protocol(format!("unexpected ping reply: {reply:?}")))
            }
        })
        .is_some()
    }

    /// Change the I/O timeout. The new value is kept only if it was applied.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> bool {
        let applied = self
            .with_single_retry("set_timeout", |transport| transport.set_timeout(timeout))
            .is_some();
        if applied {
            self.config.timeout = timeout;
        }
        applied
    }

    /// Turn on TCP keepalive probing for the session.
    pub fn enable_keepalive(&mut self) -> bool {
        self.with_single_retry("enable_keepalive", |transport| transport.enable_keepalive())
            .is_some()
    }

    /// Run an infrequent operation, reconnecting once if it fails.
    fn with_single_retry<T>(
        &mut self,
        op: &'static str,
        mut f: impl FnMut(&mut dyn Transport) -> Result<T>,
    ) -> Option<T> {
        let transport = self.transport.as_deref_mut()?;
        match f(transport) {
            Ok(value) => return Some(value),
            Err(e) => {
                self.failures.increment();
                tracing::debug!(key = %self.key, op, error = %e, "operation failed, reconnecting");
            }
        }

        match self.reconnect() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                tracing::error!(key = %self.key, op, error = %e, "reconnect rejected");
                return None;
            }
        }

        let transport = self.transport.as_deref_mut()?;
        match f(transport) {
            Ok(value) => Some(value),
            Err(e) => {
                self.failures.increment();
                tracing::debug!(key = %self.key, op, error = %e, "operation failed after reconnect");
                None
            }
        }
    }

    fn record_connect_failure(&mut self, err: &PoolError) {
        self.failures.increment();
        self.pool_failures.increment();
        self.stats.record_connect_failure();
        tracing::warn!(key = %self.key, error = %err, "connection failed");
    }

    fn auth_error(&self) -> PoolError {
        PoolError::AuthRejected {
            key: self.key.clone(),
            reason: self.rejection.clone().unwrap_or_default(),
        }
    }
}

impl Drop for ManagedConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedConnection")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("failures", &self.failures.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::config::RetryPolicy;
    use crate::connection::mock::MockConnector;
    use std::time::Instant;

    fn managed(connector: &MockConnector, config: ConnectionConfig) -> (ManagedConnection, FailureCounter) {
        let signal = FailureCounter::new();
        let conn = ManagedConnection::new(
            ConnectionKey::new("localhost", 6379),
            config,
            Arc::new(connector.clone()),
            signal.clone(),
        );
        (conn, signal)
    }

    #[test]
    fn test_connect_and_execute() {
        let connector = MockConnector::new();
        let (mut conn, _) = managed(&connector, ConnectionConfig::default());

        assert!(conn.connect().unwrap());
        assert!(conn.connect().unwrap());
        assert_eq!(connector.server().connects(), 1);
        assert_eq!(conn.state(), ConnectionState::Connected);

        assert!(conn.execute("SET abc hello").unwrap().is_ok());
        assert_eq!(conn.execute("GET abc").unwrap().as_str(), Some("hello"));
        assert_eq!(conn.execute("DEL abc").unwrap().as_integer(), Some(1));
        assert_eq!(conn.link_failures(), 0);
        assert_eq!(conn.stats().commands_sent, 3);
    }

    #[test]
    fn test_connect_failure_is_counted() {
        let connector = MockConnector::new();
        connector.server().refuse_connects.store(true, Ordering::SeqCst);
        let (mut conn, signal) = managed(&connector, ConnectionConfig::default());

        assert!(!conn.connect().unwrap());
        assert!(!conn.is_connected());
        assert_eq!(conn.link_failures(), 1);
        assert_eq!(signal.get(), 1);

        // Unconnected: fails immediately without touching the server.
        assert!(conn.execute("GET abc").is_none());
        assert_eq!(connector.server().commands(), 0);
        assert_eq!(connector.server().connects(), 1);
    }

    #[test]
    fn test_auth_rejected_is_fatal() {
        let connector = MockConnector::new().with_password("right");
        let (mut conn, signal) =
            managed(&connector, ConnectionConfig::default().with_password("wrong"));

        let err = conn.connect().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(conn.state(), ConnectionState::Failed);
        assert_eq!(signal.get(), 0);

        // Never retried against the server again.
        assert!(matches!(conn.connect(), Err(PoolError::AuthRejected { .. })));
        assert!(matches!(conn.reconnect(), Err(PoolError::AuthRejected { .. })));
        assert_eq!(connector.server().connects(), 1);
        assert!(conn.execute("GET abc").is_none());
        assert!(!conn.ping());
    }

    #[test]
    fn test_auth_accepted() {
        let connector = MockConnector::new().with_password("right");
        let (mut conn, _) = managed(&connector, ConnectionConfig::default().with_password("right"));

        assert!(conn.connect().unwrap());
        assert!(conn.ping());
    }

    #[test]
    fn test_select_failure_is_soft() {
        let connector = MockConnector::new();
        connector.server().reject_select.store(true, Ordering::SeqCst);
        let (mut conn, signal) = managed(&connector, ConnectionConfig::default().with_database(99));

        assert!(!conn.connect().unwrap());
        assert!(!conn.is_connected());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.link_failures(), 1);
        assert_eq!(signal.get(), 1);

        connector.server().reject_select.store(false, Ordering::SeqCst);
        assert!(conn.reconnect().unwrap());
        assert_eq!(conn.link_failures(), 0);
    }

    #[test]
    fn test_transient_failure_recovers() {
        let connector = MockConnector::new();
        let (mut conn, _) = managed(&connector, ConnectionConfig::default());
        conn.connect().unwrap();

        connector.server().fail_next.store(1, Ordering::SeqCst);
        assert!(conn.execute("SET k v").unwrap().is_ok());
        assert_eq!(conn.link_failures(), 0);
        assert_eq!(connector.server().connects(), 2);
        assert_eq!(conn.stats().reconnect_count, 1);
    }

    #[test]
    fn test_retry_budget_exhausted() {
        let connector = MockConnector::new();
        let (mut conn, _) = managed(&connector, ConnectionConfig::default());
        conn.connect().unwrap();

        connector.server().fail_commands.store(true, Ordering::SeqCst);
        assert!(conn.execute("GET k").is_none());
        assert!(conn.link_failures() > 0);
        // One initial connect plus one reconnect per retry.
        assert_eq!(connector.server().connects(), 3);
        assert_eq!(conn.stats().commands_failed, 3);
    }

    #[test]
    fn test_no_retry_policy() {
        let connector = MockConnector::new();
        let config = ConnectionConfig::default().with_retry_policy(RetryPolicy::no_retry());
        let (mut conn, _) = managed(&connector, config);
        conn.connect().unwrap();

        connector.server().fail_next.store(1, Ordering::SeqCst);
        assert!(conn.execute("GET k").is_none());
        assert_eq!(connector.server().connects(), 1);
        assert_eq!(conn.link_failures(), 1);
    }

    #[test]
    fn test_failing_execute_blocks_for_every_attempt() {
        let timeout = Duration::from_millis(60);
        let connector = MockConnector::new();
        *connector.server().failure_delay.lock() = timeout;
        let (mut conn, _) = managed(&connector, ConnectionConfig::default().with_timeout(timeout));
        conn.connect().unwrap();

        connector.server().fail_commands.store(true, Ordering::SeqCst);
        let start = Instant::now();
        assert!(conn.execute("GET k").is_none());
        let elapsed = start.elapsed();
        // One initial attempt plus two retries, each waiting out the timeout.
        assert!(elapsed >= timeout * 3);
        assert!(elapsed < timeout * 5, "took {elapsed:?}");
    }

    #[test]
    fn test_revoked_connection_does_not_reconnect() {
        let connector = MockConnector::new();
        let (mut conn, _) = managed(&connector, ConnectionConfig::default());
        conn.connect().unwrap();

        conn.revocation().store(true, Ordering::SeqCst);
        assert!(!conn.reconnect().unwrap());
        assert!(!conn.is_connected());
        assert_eq!(connector.server().connects(), 1);
    }

    #[test]
    fn test_ping_reconnects_once() {
        let connector = MockConnector::new();
        let (mut conn, _) = managed(&connector, ConnectionConfig::default());
        conn.connect().unwrap();

        connector.server().fail_next.store(1, Ordering::SeqCst);
        assert!(conn.ping());
        assert_eq!(connector.server().connects(), 2);

        connector.server().fail_next.store(2, Ordering::SeqCst);
        assert!(!conn.ping());
        assert_eq!(connector.server().connects(), 3);
        assert_eq!(conn.link_failures(), 1);
    }

    #[test]
    fn test_set_timeout() {
        let connector = MockConnector::new();
        let (mut conn, _) = managed(&connector, ConnectionConfig::default());
        assert!(!conn.set_timeout(Some(Duration::from_millis(300))));

        conn.connect().unwrap();
        connector.server().fail_admin_next.store(1, Ordering::SeqCst);
        assert!(conn.set_timeout(Some(Duration::from_millis(300))));
        assert_eq!(conn.config().timeout, Some(Duration::from_millis(300)));

        connector.server().fail_admin_next.store(2, Ordering::SeqCst);
        assert!(!conn.set_timeout(Some(Duration::from_millis(900))));
        assert_eq!(conn.config().timeout, Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_enable_keepalive() {
        let connector = MockConnector::new();
        let (mut conn, _) = managed(&connector, ConnectionConfig::default());
        assert!(!conn.enable_keepalive());

        conn.connect().unwrap();
        assert!(conn.enable_keepalive());

        connector.server().fail_admin_next.store(1, Ordering::SeqCst);
        connector.server().refuse_connects.store(true, Ordering::SeqCst);
        assert!(!conn.enable_keepalive());
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_close_is_idempotent() {
        let connector = MockConnector::new();
        let (mut conn, _) = managed(&connector, ConnectionConfig::default());
        conn.connect().unwrap();

        conn.close();
        conn.close();
        assert!(!conn.is_connected());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.execute("GET k").is_none());
    }
}
