//! Process-wide cache service handed to the DAO factory

use std::sync::Arc;

use tessera_core::{Connection, ConnectionParams, Fingerprint, Result};

use crate::cache::{ClientCache, ClientProvisioner};
use crate::config::CacheConfig;
use crate::schema_cache::IntrospectionCache;
use crate::tunnel::{Ssh2TunnelFactory, TunnelFactory};

/// Owns the client/tunnel cache and the introspection cache.
///
/// Create one at process start, share it (`Arc`) with every adapter and
/// call [`CacheService::shutdown`] before exit.
pub struct CacheService {
    clients: ClientCache,
    introspection: IntrospectionCache,
}

impl Default for CacheService {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl CacheService {
    /// Cache service opening tunnels with ssh2
    pub fn new(config: CacheConfig) -> Self {
        Self::with_tunnel_factory(config, Arc::new(Ssh2TunnelFactory))
    }

    pub fn with_tunnel_factory(config: CacheConfig, tunnels: Arc<dyn TunnelFactory>) -> Self {
        Self {
            clients: ClientCache::new(config, tunnels),
            introspection: IntrospectionCache::new(),
        }
    }

    pub fn clients(&self) -> &ClientCache {
        &self.clients
    }

    pub fn introspection(&self) -> &IntrospectionCache {
        &self.introspection
    }

    /// Shorthand for [`ClientCache::acquire`]
    pub async fn acquire(
        &self,
        params: &ConnectionParams,
        provisioner: Arc<dyn ClientProvisioner>,
    ) -> Result<Arc<dyn Connection>> {
        self.clients.acquire(params, provisioner).await
    }

    /// Drop the client and all introspection results of one connection
    pub async fn invalidate(&self, fingerprint: &Fingerprint) {
        self.introspection.invalidate_connection(fingerprint);
        self.clients.invalidate(fingerprint).await;
    }

    /// Forget cached introspection of one table, e.g. after its settings
    /// were saved or its schema changed
    pub fn invalidate_table(&self, fingerprint: &Fingerprint, table: &str) {
        self.introspection.invalidate_table(fingerprint, table);
    }

    /// Close every client and tunnel and clear the introspection cache
    pub async fn shutdown(&self) {
        self.clients.shutdown().await;
        self.introspection.clear();
    }
}
