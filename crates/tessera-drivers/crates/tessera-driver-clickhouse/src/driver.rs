//! Client provisioning for ClickHouse

use std::sync::Arc;

use async_trait::async_trait;
use tessera_connection::{CacheService, ClientProvisioner, Endpoint};
use tessera_core::{Connection, ConnectionParams, DaoConfig, DaoError, Result};
use tessera_query::SqlTableDao;

use crate::{ClickHouseConnection, ClickHouseDialect};

/// Builds an HTTP client for the endpoint the cache hands out
#[derive(Debug, Default)]
pub struct ClickHouseProvisioner;

impl ClickHouseProvisioner {
    pub(crate) fn url(params: &ConnectionParams, endpoint: &Endpoint) -> Result<String> {
        if params.cert.as_deref().is_some_and(|c| !c.trim().is_empty()) {
            return Err(DaoError::Configuration(
                "ClickHouse over HTTPS verifies against the system roots; a custom CA is not supported"
                    .to_string(),
            ));
        }
        let scheme = if params.ssl { "https" } else { "http" };
        Ok(format!("{}://{}:{}", scheme, endpoint.host, endpoint.port))
    }

    pub(crate) fn client(params: &ConnectionParams, endpoint: &Endpoint) -> Result<clickhouse::Client> {
        let mut client = clickhouse::Client::default()
            .with_url(Self::url(params, endpoint)?)
            .with_user(params.username.as_deref().filter(|u| !u.is_empty()).unwrap_or("default"))
            .with_password(params.password.as_deref().unwrap_or_default())
            // Mutations finish before the statement returns, so a read right
            // after an update sees it
            .with_option("mutations_sync", "1")
            // Dropping a request (an abandoned count) stops the server-side query
            .with_option("cancel_http_readonly_queries_on_client_close", "1");
        if let Some(database) = params.database.as_deref().filter(|d| !d.is_empty()) {
            client = client.with_database(database);
        }
        Ok(client)
    }
}

#[async_trait]
impl ClientProvisioner for ClickHouseProvisioner {
    #[tracing::instrument(skip_all, fields(host = %endpoint.host, port = endpoint.port, tunnel = endpoint.via_tunnel))]
    async fn connect(
        &self,
        params: &ConnectionParams,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn Connection>> {
        let client = Self::client(params, endpoint)?;
        Ok(Arc::new(ClickHouseConnection::connect(client).await?))
    }
}

/// Table DAO for a ClickHouse database
pub fn clickhouse_dao(
    params: ConnectionParams,
    caches: Arc<CacheService>,
    config: DaoConfig,
) -> SqlTableDao {
    SqlTableDao::new(
        params,
        Arc::new(ClickHouseDialect),
        Arc::new(ClickHouseProvisioner),
        caches,
        config,
    )
}
