//! SSH tunnel configuration
//!
//! Built from the `ssh*` fields of [`ConnectionParams`](crate::ConnectionParams)
//! when `ssh = true`. Only public-key authentication with in-memory PEM
//! material is supported.

use serde::{Deserialize, Serialize};

use crate::{DaoError, Result};

/// SSH tunnel configuration
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SshTunnelConfig {
    /// SSH server hostname
    pub host: String,
    /// SSH server port (default: 22)
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// SSH username
    pub username: String,
    /// PEM-encoded private key material
    pub private_key: String,
    /// Optional passphrase protecting the key
    #[serde(default)]
    pub passphrase: Option<String>,
    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Keep-alive interval in seconds (0 = disabled)
    #[serde(default = "default_keepalive")]
    pub keepalive_seconds: u64,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_timeout() -> u64 {
    30
}

fn default_keepalive() -> u64 {
    60
}

impl std::fmt::Debug for SshTunnelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTunnelConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("private_key", &"<redacted>")
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl SshTunnelConfig {
    /// Create a new SSH tunnel configuration with key-based authentication
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            private_key: private_key.into(),
            passphrase: None,
            timeout_seconds: default_timeout(),
            keepalive_seconds: default_keepalive(),
        }
    }

    /// Set the key passphrase
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Set the connection timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Get the SSH server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(DaoError::Configuration(
                "SSH host cannot be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(DaoError::Configuration("SSH port cannot be 0".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(DaoError::Configuration(
                "SSH username cannot be empty".to_string(),
            ));
        }
        if !self.private_key.contains("-----BEGIN") {
            return Err(DaoError::Configuration(
                "SSH private key must be PEM-encoded".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
