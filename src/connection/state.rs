//! Connection state and failure accounting.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No live session.
    #[default]
    Disconnected,
    /// Connected, authenticated and on the configured database.
    Connected,
    /// The server rejected the credential; the connection is unusable.
    Failed,
}

impl ConnectionState {
    /// Check if the connection is usable.
    pub fn is_connected(&self) -> bool {
        *self == ConnectionState::Connected
    }

    /// Check if the connection has failed permanently.
    pub fn is_failed(&self) -> bool {
        *self == ConnectionState::Failed
    }
}

/// A shared counter of low-level failures.
///
/// Used both per connection (consecutive failures since the last successful
/// connect) and per pool (connect failures since the last repair sweep).
/// Clones share the same count.
#[derive(Debug, Clone, Default)]
pub struct FailureCounter(Arc<AtomicUsize>);

impl FailureCounter {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count.
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    /// Increment and return the new count.
    pub fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Reset to zero.
    pub fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }

    /// Reset to zero, returning the previous count.
    pub fn take(&self) -> usize {
        self.0.swap(0, Ordering::AcqRel)
    }
}

/// Connection statistics.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Number of successful connections.
    pub connect_count: u64,
    /// Number of failed connection attempts.
    pub connect_failures: u64,
    /// Number of reconnect attempts made by retries and repairs.
    pub reconnect_count: u64,
    /// Number of commands issued, retries included.
    pub commands_sent: u64,
    /// Number of command issues that failed at the transport level.
    pub commands_failed: u64,
    /// Time of last successful connection.
    pub last_connected: Option<Instant>,
    /// Time of last disconnect.
    pub last_disconnected: Option<Instant>,
    /// Time of last error.
    pub last_error: Option<Instant>,
}

impl ConnectionStats {
    /// Record a successful connection.
    pub fn record_connect(&mut self) {
        self.connect_count += 1;
        self.last_connected = Some(Instant::now());
    }

    /// Record a disconnection.
    pub fn record_disconnect(&mut self) {
        self.last_disconnected = Some(Instant::now());
    }

    /// Record a connection failure.
    pub fn record_connect_failure(&mut self) {
        self.connect_failures += 1;
        self.last_error = Some(Instant::now());
    }

    /// Record a reconnection attempt.
    pub fn record_reconnect(&mut self) {
        self.reconnect_count += 1;
    }

    /// Record a command outcome.
    pub fn record_command(&mut self, ok: bool) {
        self.commands_sent += 1;
        if !ok {
            self.commands_failed += 1;
            self.last_error = Some(Instant::now());
        }
    }

    /// Get uptime if connected.
    pub fn uptime(&self) -> Option<std::time::Duration> {
        self.last_connected.map(|t| t.elapsed())
    }
}
