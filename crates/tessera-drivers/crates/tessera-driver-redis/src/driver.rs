//! Client provisioning for Redis

use std::sync::Arc;

use async_trait::async_trait;
use redis::IntoConnectionInfo;
use tessera_connection::{CacheService, ClientProvisioner, Endpoint};
use tessera_core::{Connection, ConnectionParams, DaoConfig, DaoError, Result};

use crate::{RedisConnection, RedisTableDao};

/// Opens a multiplexed connection to the endpoint the cache hands out
#[derive(Debug, Default)]
pub struct RedisProvisioner;

impl RedisProvisioner {
    /// Logical database index; `database` must be numeric when set
    pub(crate) fn database_index(params: &ConnectionParams) -> Result<i64> {
        match params.database.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            None => Ok(0),
            Some(db) => db.parse::<i64>().ok().filter(|n| *n >= 0).ok_or_else(|| {
                DaoError::Configuration(format!(
                    "Redis database must be a numeric index, got \"{}\"",
                    db
                ))
            }),
        }
    }

    pub(crate) fn connection_info(
        params: &ConnectionParams,
        endpoint: &Endpoint,
    ) -> Result<redis::ConnectionInfo> {
        if params.cert.as_deref().is_some_and(|c| !c.trim().is_empty()) {
            return Err(DaoError::Configuration(
                "Redis over TLS verifies against the system roots; a custom CA is not supported"
                    .to_string(),
            ));
        }
        let database = Self::database_index(params)?;
        let scheme = if params.ssl { "rediss" } else { "redis" };
        let mut url = format!("{}://{}:{}/{}", scheme, endpoint.host, endpoint.port, database);
        if params.ssl && endpoint.via_tunnel {
            // The certificate names the server, never the local tunnel end
            tracing::warn!("certificate verification skipped for tunneled Redis connection");
            url.push_str("#insecure");
        }

        let mut info = url.as_str().into_connection_info().map_err(|e| {
            DaoError::Configuration(format!("Invalid Redis connection settings: {}", e))
        })?;
        // Set after parsing so credentials never need URL escaping
        info.redis.username = params.username.clone().filter(|u| !u.is_empty());
        info.redis.password = params.password.clone().filter(|p| !p.is_empty());
        Ok(info)
    }
}

#[async_trait]
impl ClientProvisioner for RedisProvisioner {
    #[tracing::instrument(skip_all, fields(host = %endpoint.host, port = endpoint.port, tunnel = endpoint.via_tunnel))]
    async fn connect(
        &self,
        params: &ConnectionParams,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn Connection>> {
        let info = Self::connection_info(params, endpoint)?;
        Ok(Arc::new(RedisConnection::connect(info).await?))
    }
}

/// Table DAO for a Redis database
pub fn redis_dao(params: ConnectionParams, caches: Arc<CacheService>, config: DaoConfig) -> RedisTableDao {
    RedisTableDao::new(params, Arc::new(RedisProvisioner), caches, config)
}
