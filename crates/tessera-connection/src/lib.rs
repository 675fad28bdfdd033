//! Tessera Connection - shared client, tunnel and introspection caches
//!
//! Adapters never open engine clients themselves; they ask the
//! [`CacheService`] for one, which provisions it once per connection
//! fingerprint (through an SSH tunnel when configured) and revalidates it on
//! every acquisition.

pub mod cache;
mod config;
pub mod health;
pub mod schema_cache;
mod service;
#[cfg(test)]
mod testing;
pub mod tunnel;

pub use cache::{ClientCache, ClientProvisioner, Endpoint};
pub use config::CacheConfig;
pub use health::{PingError, PingResult, ping_connection};
pub use schema_cache::IntrospectionCache;
pub use service::CacheService;
pub use tunnel::{Ssh2TunnelFactory, SshTunnel, Tunnel, TunnelError, TunnelFactory};
