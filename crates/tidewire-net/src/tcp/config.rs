//! Configuration for the TCP server.

use std::time::Duration;

use tidewire_core::Config;

/// Settings for [`TcpServer`](super::TcpServer).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpServerConfig {
    /// Port to bind. 0 picks an ephemeral port.
    pub port: u16,
    /// Listen backlog.
    pub backlog: i32,
    /// Number of pool workers, which is also the number of connections read
    /// concurrently.
    pub workers: usize,
    /// Size of the per-connection receive buffer in bytes.
    pub read_buffer_size: usize,
    /// Pause after a failed accept before trying again.
    pub accept_backoff: Duration,
    /// Enable TCP_NODELAY on accepted connections.
    pub no_delay: bool,
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            backlog: 16,
            workers: 4,
            read_buffer_size: 4096,
            accept_backoff: Duration::from_millis(50),
            no_delay: false,
        }
    }
}

impl TcpServerConfig {
    /// Create a configuration for `port` with default settings.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Read settings from `section` of a layered [`Config`].
    ///
    /// Recognised keys are `port`, `backlog`, `workers`, `read_buffer_size`,
    /// `accept_backoff_ms` and `nodelay`. Missing or unconvertible keys keep
    /// their defaults.
    pub fn from_config(config: &Config, section: &str) -> Self {
        let defaults = Self::default();
        Self {
            port: config.get_or(section, "port", defaults.port),
            backlog: config.get_or(section, "backlog", defaults.backlog),
            workers: config.get_or(section, "workers", defaults.workers),
            read_buffer_size: config
                .get::<usize>(section, "read_buffer_size")
                .filter(|&size| size > 0)
                .unwrap_or(defaults.read_buffer_size),
            accept_backoff: config
                .get::<u64>(section, "accept_backoff_ms")
                .map_or(defaults.accept_backoff, Duration::from_millis),
            no_delay: config.get_or(section, "nodelay", defaults.no_delay),
        }
    }

    /// Set the listen backlog.
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Set the worker count.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the receive buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set the accept retry pause.
    pub fn accept_backoff(mut self, backoff: Duration) -> Self {
        self.accept_backoff = backoff;
        self
    }

    /// Enable or disable TCP_NODELAY on accepted connections.
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = enabled;
        self
    }
}
