//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized defaults for the monitoring runtime.
//!
//! Config is used in two ways:
//! 1. **Orchestrator creation**: `Monitor::new(config, ...)`
//! 2. **Per-service defaults**: services that leave an option unset inherit
//!    the corresponding field here (interval, timeouts, retry bounds).
//!
//! ## Sentinel values
//! - `http_timeout = 0s` → no request deadline (not recommended)
//! - `command_timeout = 0s` → commands may run unbounded

use std::time::Duration;

/// Global configuration for the monitoring runtime.
///
/// Defines:
/// - **Shutdown behavior**: grace period for runner termination
/// - **Event system**: announce-bus capacity, database-channel bounds
/// - **Polling defaults**: interval applied to services without their own
/// - **Dispatch defaults**: retry count and backoff between attempts
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum wait for runners to stop after cancellation before they are
    /// abandoned and reported stuck.
    pub grace: Duration,

    /// Poll interval for services that do not set their own.
    pub interval: Duration,

    /// Hard deadline applied to every outbound HTTP request.
    ///
    /// `Duration::ZERO` disables the deadline.
    pub http_timeout: Duration,

    /// Wall-clock budget for spawned commands; expiry kills the process group.
    ///
    /// `Duration::ZERO` lets commands run unbounded.
    pub command_timeout: Duration,

    /// Capacity of the announce broadcast channel ring buffer.
    ///
    /// Subscribers lagging by more than this many events skip the backlog.
    pub bus_capacity: usize,

    /// Capacity of the database channel drained by the persistence worker.
    pub db_capacity: usize,

    /// How long a producer may wait on a full database channel before the
    /// message is dropped and logged (in-memory state stays authoritative).
    pub db_send_grace: Duration,

    /// Default `max_tries` for actions that do not set their own.
    pub max_tries: u32,

    /// Fixed wait between failed attempts of one action.
    pub retry_backoff: Duration,
}

impl Config {
    /// Returns the HTTP deadline as an `Option`.
    ///
    /// - `None` → no deadline
    /// - `Some(d)` → applied per request
    #[inline]
    pub fn http_timeout(&self) -> Option<Duration> {
        if self.http_timeout == Duration::ZERO {
            None
        } else {
            Some(self.http_timeout)
        }
    }

    /// Returns the command budget as an `Option`.
    #[inline]
    pub fn command_timeout(&self) -> Option<Duration> {
        if self.command_timeout == Duration::ZERO {
            None
        } else {
            Some(self.command_timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `grace = 10s` (runner shutdown window)
    /// - `interval = 10m` (upstream poll cadence)
    /// - `http_timeout = 30s`
    /// - `command_timeout = 60s`
    /// - `bus_capacity = 1024`
    /// - `db_capacity = 512`, `db_send_grace = 250ms`
    /// - `max_tries = 3`, `retry_backoff = 15s`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(10),
            interval: Duration::from_secs(600),
            http_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(60),
            bus_capacity: 1024,
            db_capacity: 512,
            db_send_grace: Duration::from_millis(250),
            max_tries: 3,
            retry_backoff: Duration::from_secs(15),
        }
    }
}
