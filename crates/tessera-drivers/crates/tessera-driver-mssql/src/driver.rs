//! Client provisioning for MS SQL Server

use std::sync::Arc;

use async_trait::async_trait;
use tessera_connection::{CacheService, ClientProvisioner, Endpoint};
use tessera_core::{Connection, ConnectionParams, DaoConfig, DaoError, Result};
use tessera_query::SqlTableDao;
use tiberius::{AuthMethod, Config, EncryptionLevel};

use crate::{MssqlConnection, MssqlDialect};

/// Connects with SQL Server authentication to the endpoint the cache hands
/// out
#[derive(Debug, Default)]
pub struct MssqlProvisioner;

impl MssqlProvisioner {
    pub(crate) fn config(params: &ConnectionParams, endpoint: &Endpoint) -> Result<Config> {
        let username = params
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                DaoError::Configuration("MS SQL Server requires a username".to_string())
            })?;

        let mut config = Config::new();
        config.host(&endpoint.host);
        config.port(endpoint.port);
        config.application_name("tessera");
        config.authentication(AuthMethod::sql_server(
            username,
            params.password.as_deref().unwrap_or_default(),
        ));
        if let Some(database) = params.database.as_deref().filter(|d| !d.is_empty()) {
            config.database(database);
        }

        if !params.ssl {
            // Only the login packet is encrypted
            config.encryption(EncryptionLevel::Off);
            return Ok(config);
        }

        config.encryption(EncryptionLevel::Required);
        match params.cert.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(pem) if pem.starts_with("-----BEGIN") => {
                return Err(DaoError::Configuration(
                    "MS SQL Server takes the CA certificate as a file path, not inline PEM"
                        .to_string(),
                ));
            }
            // The certificate names the server, never the local tunnel end
            Some(_) if endpoint.via_tunnel => {
                tracing::warn!("CA verification skipped for tunneled MS SQL Server connection");
                config.trust_cert();
            }
            Some(path) => config.trust_cert_ca(path),
            None => config.trust_cert(),
        }
        Ok(config)
    }
}

#[async_trait]
impl ClientProvisioner for MssqlProvisioner {
    #[tracing::instrument(skip_all, fields(host = %endpoint.host, port = endpoint.port, tunnel = endpoint.via_tunnel))]
    async fn connect(
        &self,
        params: &ConnectionParams,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn Connection>> {
        let config = Self::config(params, endpoint)?;
        Ok(Arc::new(MssqlConnection::connect(config).await?))
    }
}

/// Table DAO for an MS SQL Server database
pub fn mssql_dao(params: ConnectionParams, caches: Arc<CacheService>, config: DaoConfig) -> SqlTableDao {
    SqlTableDao::new(params, Arc::new(MssqlDialect), Arc::new(MssqlProvisioner), caches, config)
}
