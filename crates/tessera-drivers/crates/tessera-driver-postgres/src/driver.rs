//! Client provisioning for PostgreSQL

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tessera_connection::{CacheService, ClientProvisioner, Endpoint};
use tessera_core::{Connection, ConnectionParams, DaoConfig, Result};
use tessera_query::SqlTableDao;

use crate::tls::tls_connector;
use crate::{PostgresConnection, PostgresDialect};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Connects to the endpoint the cache hands out, which is the local end of
/// the SSH tunnel when one is configured
#[derive(Debug, Default)]
pub struct PostgresProvisioner;

impl PostgresProvisioner {
    pub(crate) fn config(params: &ConnectionParams, endpoint: &Endpoint) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&endpoint.host)
            .port(endpoint.port)
            .dbname(params.database.as_deref().filter(|d| !d.is_empty()).unwrap_or("postgres"))
            .user(params.username.as_deref().unwrap_or("postgres"))
            .application_name("tessera")
            .connect_timeout(CONNECT_TIMEOUT);
        if let Some(password) = params.password.as_deref() {
            config.password(password);
        }
        config.ssl_mode(if params.ssl {
            tokio_postgres::config::SslMode::Require
        } else {
            tokio_postgres::config::SslMode::Disable
        });
        config
    }
}

#[async_trait]
impl ClientProvisioner for PostgresProvisioner {
    #[tracing::instrument(skip_all, fields(host = %endpoint.host, port = endpoint.port, tunnel = endpoint.via_tunnel))]
    async fn connect(
        &self,
        params: &ConnectionParams,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn Connection>> {
        let config = Self::config(params, endpoint);
        let tls = if params.ssl {
            Some(tls_connector(params, endpoint.via_tunnel)?)
        } else {
            None
        };
        Ok(Arc::new(PostgresConnection::connect(config, tls).await?))
    }
}

/// Table DAO for a PostgreSQL database
pub fn postgres_dao(
    params: ConnectionParams,
    caches: Arc<CacheService>,
    config: DaoConfig,
) -> SqlTableDao {
    SqlTableDao::new(
        params,
        Arc::new(PostgresDialect::new()),
        Arc::new(PostgresProvisioner),
        caches,
        config,
    )
}
