//! Security configuration for connections

pub mod ssh_config;

pub use ssh_config::SshTunnelConfig;
