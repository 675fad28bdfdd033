//! Connection cache configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeouts used while provisioning and revalidating cached clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Timeout in milliseconds for the ping run on every acquisition
    ping_timeout_ms: u64,
    /// Timeout in milliseconds for connecting a new client (tunnel excluded)
    connect_timeout_ms: u64,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ping timeout in milliseconds
    pub fn with_ping_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.ping_timeout_ms = timeout_ms;
        self
    }

    /// Set the connect timeout in milliseconds
    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for CacheConfig {
    /// Defaults:
    /// - ping_timeout: 5 seconds
    /// - connect_timeout: 30 seconds
    fn default() -> Self {
        Self {
            ping_timeout_ms: 5_000,
            connect_timeout_ms: 30_000,
        }
    }
}
