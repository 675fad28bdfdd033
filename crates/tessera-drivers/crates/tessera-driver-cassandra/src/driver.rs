//! Client provisioning for Cassandra

use std::sync::Arc;

use async_trait::async_trait;
use scylla::transport::load_balancing::DefaultPolicy;
use scylla::{ExecutionProfile, SessionBuilder};
use tessera_connection::{CacheService, ClientProvisioner, Endpoint};
use tessera_core::{Connection, ConnectionParams, DaoConfig, DaoError, Result};

use crate::{CassandraConnection, CassandraTableDao};

/// Extra parameter naming the local datacenter
pub(crate) const DATACENTER_EXTRA: &str = "dataCenter";

/// Builds a session against the endpoint the cache hands out
#[derive(Debug, Default)]
pub struct CassandraProvisioner;

impl CassandraProvisioner {
    /// Datacenter whose replicas are preferred, when one is configured
    pub(crate) fn datacenter(params: &ConnectionParams) -> Option<String> {
        params
            .extra_str(DATACENTER_EXTRA)
            .map(str::trim)
            .filter(|dc| !dc.is_empty())
            .map(str::to_string)
    }

    /// `host:port` contact point; IPv6 hosts are bracketed
    pub(crate) fn known_node(endpoint: &Endpoint) -> String {
        if endpoint.host.contains(':') && !endpoint.host.starts_with('[') {
            format!("[{}]:{}", endpoint.host, endpoint.port)
        } else {
            format!("{}:{}", endpoint.host, endpoint.port)
        }
    }

    pub(crate) fn check_settings(params: &ConnectionParams, endpoint: &Endpoint) -> Result<()> {
        if params.ssl {
            return Err(DaoError::Configuration(
                "Cassandra over TLS is not supported by this build".to_string(),
            ));
        }
        if endpoint.via_tunnel {
            // Peers are discovered by their own addresses, outside the tunnel
            tracing::warn!("tunneled Cassandra sessions only reach the contact node");
        }
        Ok(())
    }

    /// Token-aware routing, pinned to the datacenter when one is named
    pub(crate) fn execution_profile(datacenter: Option<String>) -> ExecutionProfile {
        let mut policy = DefaultPolicy::builder().token_aware(true);
        if let Some(datacenter) = datacenter {
            policy = policy.prefer_datacenter(datacenter).permit_dc_failover(false);
        }
        ExecutionProfile::builder()
            .load_balancing_policy(policy.build())
            .build()
    }

    fn session_builder(params: &ConnectionParams, endpoint: &Endpoint) -> Result<SessionBuilder> {
        Self::check_settings(params, endpoint)?;
        let profile = Self::execution_profile(Self::datacenter(params));
        let mut builder = SessionBuilder::new()
            .known_node(Self::known_node(endpoint))
            .default_execution_profile_handle(profile.into_handle());
        if let Some(user) = params.username.as_deref().filter(|u| !u.is_empty()) {
            builder = builder.user(user, params.password.as_deref().unwrap_or_default());
        }
        Ok(builder)
    }
}

#[async_trait]
impl ClientProvisioner for CassandraProvisioner {
    #[tracing::instrument(skip_all, fields(host = %endpoint.host, port = endpoint.port, tunnel = endpoint.via_tunnel))]
    async fn connect(
        &self,
        params: &ConnectionParams,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn Connection>> {
        let session = Self::session_builder(params, endpoint)?
            .build()
            .await
            .map_err(|e| DaoError::Connection(format!("Failed to connect to Cassandra: {}", e)))?;
        Ok(Arc::new(CassandraConnection::connect(session).await?))
    }
}

/// Table DAO for a Cassandra keyspace
pub fn cassandra_dao(
    params: ConnectionParams,
    caches: Arc<CacheService>,
    config: DaoConfig,
) -> CassandraTableDao {
    CassandraTableDao::new(params, Arc::new(CassandraProvisioner), caches, config)
}
