//! Connection and pool configuration types.

use std::time::Duration;

use crate::types::DEFAULT_TIMEOUT;

/// Pause taken before each reconnect when a command is retried.
///
/// A failing command already blocks for up to the I/O timeout per attempt, so
/// the default is no extra pause. A non-zero backoff gives a restarting
/// server time to come back before the retry reconnects.
#[derive(Debug, Clone)]
pub enum BackoffStrategy {
    /// Fixed delay between attempts.
    Fixed(Duration),
    /// Exponential backoff with configurable parameters.
    Exponential {
        /// Initial delay.
        base: Duration,
        /// Maximum delay.
        max: Duration,
        /// Multiplier for each attempt.
        multiplier: f64,
    },
    /// Linear backoff with configurable parameters.
    Linear {
        /// Initial delay.
        initial: Duration,
        /// Increment per attempt.
        increment: Duration,
        /// Maximum delay.
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Pause before the reconnect that follows failed attempt `attempt`
    /// (0 is the first issue of the command).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(d) => *d,
            BackoffStrategy::Exponential {
                base,
                max,
                multiplier,
            } => {
                let delay_ms = base.as_millis() as f64 * multiplier.powi(attempt as i32);
                Duration::from_millis(delay_ms.min(max.as_millis() as f64) as u64)
            }
            BackoffStrategy::Linear {
                initial,
                increment,
                max,
            } => {
                let delay = *initial + (*increment * attempt);
                delay.min(*max)
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Fixed(Duration::ZERO)
    }
}

/// Retry policy applied around command execution.
///
/// The default retries twice, reconnecting immediately each time: a failing
/// command costs at most three round trips before it is reported as failed.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    /// Delay before each reconnect.
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: BackoffStrategy::default(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            backoff: BackoffStrategy::default(),
        }
    }

    /// Create a policy with fixed delay retries.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: BackoffStrategy::Fixed(delay),
        }
    }

    /// Check if another retry attempt should be made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Pause before reconnecting after failed attempt `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay_for_attempt(attempt)
    }
}

/// TCP keepalive settings.
#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    /// Idle time before the first probe is sent.
    pub idle: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(60),
        }
    }
}

/// Per-connection configuration.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Password sent with `AUTH` after connecting. `None` skips authentication.
    pub password: Option<String>,
    /// Database index selected after authentication.
    pub database: u32,
    /// Connect and I/O timeout. `None` blocks indefinitely.
    pub timeout: Option<Duration>,
    /// Retry policy for failing commands.
    pub retry_policy: RetryPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            password: None,
            database: 0,
            timeout: Some(DEFAULT_TIMEOUT),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("timeout", &self.timeout)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl ConnectionConfig {
    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the database index.
    pub fn with_database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    /// Set the connect and I/O timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable the timeout.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of tracked connections, idle and in use combined.
    pub max_size: usize,
    /// Configuration for connections created by `acquire`.
    pub connection_config: ConnectionConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            connection_config: ConnectionConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Set the maximum pool size.
    pub fn with_max_size(mut self, max: usize) -> Self {
        self.max_size = max;
        self
    }

    /// Set the connection configuration.
    pub fn with_connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection_config = config;
        self
    }
}
