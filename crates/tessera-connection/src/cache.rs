//! Keyed cache of live engine clients and their SSH tunnels
//!
//! One entry per connection fingerprint. Acquisition is single-flight:
//! the first caller on a miss provisions (tunnel first, then client) and
//! every concurrent caller for the same fingerprint awaits that same
//! in-flight attempt. Cached entries are pinged on every acquisition and
//! replaced when the ping fails; nothing expires on a timer.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tessera_core::{Connection, ConnectionParams, DaoError, Fingerprint, Result};

use crate::config::CacheConfig;
use crate::health::ping_connection;
use crate::tunnel::{Tunnel, TunnelFactory};

/// Where a new client should connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// The endpoint is the local side of an SSH tunnel
    pub via_tunnel: bool,
}

impl Endpoint {
    /// The host and port from the parameters
    pub fn direct(params: &ConnectionParams) -> Self {
        Self {
            host: params.host.clone(),
            port: params.port_or_default(),
            via_tunnel: false,
        }
    }

    /// Local end of a tunnel
    pub fn tunneled(local_port: u16) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: local_port,
            via_tunnel: true,
        }
    }
}

/// Creates engine clients on cache misses
#[async_trait]
pub trait ClientProvisioner: Send + Sync {
    /// Connect a new client to `endpoint` with the credentials in `params`
    async fn connect(
        &self,
        params: &ConnectionParams,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn Connection>>;
}

/// A provisioned client and the tunnel it runs through
struct CachedClient {
    connection: Arc<dyn Connection>,
    tunnel: Option<Box<dyn Tunnel>>,
    created_at: Instant,
}

impl CachedClient {
    async fn teardown(&self, fingerprint: &Fingerprint) {
        if let Err(e) = self.connection.close().await {
            tracing::debug!(%fingerprint, error = %e, "error closing evicted client");
        }
        tracing::info!(
            %fingerprint,
            age_ms = self.created_at.elapsed().as_millis() as u64,
            tunneled = self.tunnel.is_some(),
            "client evicted"
        );
    }
}

type ProvisionResult = std::result::Result<Arc<CachedClient>, Arc<DaoError>>;
type InFlight = Shared<BoxFuture<'static, ProvisionResult>>;

enum Slot {
    Provisioning { attempt: u64, future: InFlight },
    Ready(Arc<CachedClient>),
}

enum Lookup {
    Hit(Arc<CachedClient>),
    Join(u64, InFlight),
}

/// The connection/tunnel cache
pub struct ClientCache {
    config: CacheConfig,
    tunnels: Arc<dyn TunnelFactory>,
    slots: Mutex<HashMap<Fingerprint, Slot>>,
    attempts: AtomicU64,
}

impl ClientCache {
    pub fn new(config: CacheConfig, tunnels: Arc<dyn TunnelFactory>) -> Self {
        Self {
            config,
            tunnels,
            slots: Mutex::new(HashMap::new()),
            attempts: AtomicU64::new(0),
        }
    }

    /// Get a live client for `params`, provisioning one if needed.
    ///
    /// A cached client that fails its ping is closed, evicted and replaced.
    /// Provisioning errors evict the partial entry and propagate; there is
    /// no retry.
    pub async fn acquire(
        &self,
        params: &ConnectionParams,
        provisioner: Arc<dyn ClientProvisioner>,
    ) -> Result<Arc<dyn Connection>> {
        let fingerprint = params.fingerprint();

        let existing = {
            let slots = self.slots.lock();
            match slots.get(&fingerprint) {
                Some(Slot::Ready(client)) => Some(Lookup::Hit(client.clone())),
                Some(Slot::Provisioning { attempt, future }) => {
                    Some(Lookup::Join(*attempt, future.clone()))
                }
                None => None,
            }
        };

        match existing {
            Some(Lookup::Hit(client)) => {
                if self.is_usable(&client).await {
                    tracing::debug!(%fingerprint, "client cache hit");
                    return Ok(client.connection.clone());
                }
                tracing::warn!(%fingerprint, "cached client failed liveness check");
                if self.remove_if_current(&fingerprint, &client) {
                    client.teardown(&fingerprint).await;
                }
            }
            Some(Lookup::Join(attempt, future)) => {
                tracing::debug!(%fingerprint, "joining in-flight provisioning");
                return self.settle(&fingerprint, attempt, future).await;
            }
            None => tracing::debug!(%fingerprint, "client cache miss"),
        }

        let (attempt, future) = {
            let mut slots = self.slots.lock();
            match slots.get(&fingerprint) {
                // Another caller finished provisioning while this one pinged.
                Some(Slot::Ready(client)) => return Ok(client.connection.clone()),
                Some(Slot::Provisioning { attempt, future }) => (*attempt, future.clone()),
                None => {
                    let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
                    let future = self.provision(params.clone(), provisioner);
                    slots.insert(
                        fingerprint.clone(),
                        Slot::Provisioning {
                            attempt,
                            future: future.clone(),
                        },
                    );
                    (attempt, future)
                }
            }
        };

        self.settle(&fingerprint, attempt, future).await
    }

    /// Drop the entry for `fingerprint`, closing its client and tunnel
    pub async fn invalidate(&self, fingerprint: &Fingerprint) {
        let removed = self.slots.lock().remove(fingerprint);
        if let Some(Slot::Ready(client)) = removed {
            client.teardown(fingerprint).await;
        }
    }

    /// Evict after an operational error that means the client is unusable
    pub async fn evict_on_error(&self, fingerprint: &Fingerprint, error: &DaoError) {
        if error.is_connectivity() {
            tracing::warn!(%fingerprint, error = %error, "evicting client after connectivity error");
            self.invalidate(fingerprint).await;
        }
    }

    /// Number of entries, provisioning ones included
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every client and tunnel
    pub async fn shutdown(&self) {
        let drained: Vec<(Fingerprint, Slot)> = self.slots.lock().drain().collect();
        tracing::info!(entries = drained.len(), "shutting down client cache");
        for (fingerprint, slot) in drained {
            if let Slot::Ready(client) = slot {
                client.teardown(&fingerprint).await;
            }
        }
    }

    fn provision(
        &self,
        params: ConnectionParams,
        provisioner: Arc<dyn ClientProvisioner>,
    ) -> InFlight {
        let tunnels = self.tunnels.clone();
        let connect_timeout = self.config.connect_timeout();

        async move {
            let started = Instant::now();
            let tunnel = match params.ssh_tunnel_config()? {
                Some(ssh) => Some(
                    tunnels
                        .open(&ssh, &params.host, params.port_or_default())
                        .await?,
                ),
                None => None,
            };
            let endpoint = match &tunnel {
                Some(tunnel) => Endpoint::tunneled(tunnel.local_port()),
                None => Endpoint::direct(&params),
            };

            // A failed connect drops the tunnel opened above.
            let connection =
                tokio::time::timeout(connect_timeout, provisioner.connect(&params, &endpoint))
                    .await
                    .map_err(|_| {
                        DaoError::Timeout(format!(
                            "connecting to {}:{} took longer than {:?}",
                            endpoint.host, endpoint.port, connect_timeout
                        ))
                    })??;

            tracing::info!(
                db = %params.database_type,
                via_tunnel = endpoint.via_tunnel,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "client provisioned"
            );
            Ok(Arc::new(CachedClient {
                connection,
                tunnel,
                created_at: Instant::now(),
            }))
        }
        .map(|result: Result<Arc<CachedClient>>| result.map_err(Arc::new))
        .boxed()
        .shared()
    }

    /// Await an in-flight attempt and move its slot to its final state
    async fn settle(
        &self,
        fingerprint: &Fingerprint,
        attempt: u64,
        future: InFlight,
    ) -> Result<Arc<dyn Connection>> {
        let outcome = future.await;

        let mut slots = self.slots.lock();
        let current = matches!(
            slots.get(fingerprint),
            Some(Slot::Provisioning { attempt: a, .. }) if *a == attempt
        );
        match outcome {
            Ok(client) => {
                if current {
                    slots.insert(fingerprint.clone(), Slot::Ready(client.clone()));
                }
                Ok(client.connection.clone())
            }
            Err(error) => {
                if current {
                    slots.remove(fingerprint);
                }
                tracing::warn!(%fingerprint, error = %error, "client provisioning failed");
                Err(unshare(&error))
            }
        }
    }

    async fn is_usable(&self, client: &CachedClient) -> bool {
        if client.tunnel.as_ref().is_some_and(|t| !t.is_active()) {
            return false;
        }
        match ping_connection(client.connection.as_ref(), self.config.ping_timeout()).await {
            Ok(latency) => {
                tracing::trace!(latency_ms = latency.as_millis() as u64, "liveness check ok");
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "liveness check failed");
                false
            }
        }
    }

    fn remove_if_current(&self, fingerprint: &Fingerprint, client: &Arc<CachedClient>) -> bool {
        let mut slots = self.slots.lock();
        match slots.get(fingerprint) {
            Some(Slot::Ready(current)) if Arc::ptr_eq(current, client) => {
                slots.remove(fingerprint);
                true
            }
            _ => false,
        }
    }
}

/// Every waiter of a failed attempt gets an equivalent error
fn unshare(error: &DaoError) -> DaoError {
    match error {
        DaoError::Connection(m) => DaoError::Connection(m.clone()),
        DaoError::Tunnel(m) => DaoError::Tunnel(m.clone()),
        DaoError::Configuration(m) => DaoError::Configuration(m.clone()),
        DaoError::Timeout(m) => DaoError::Timeout(m.clone()),
        DaoError::UnsafeInput(m) => DaoError::UnsafeInput(m.clone()),
        other => DaoError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests;
