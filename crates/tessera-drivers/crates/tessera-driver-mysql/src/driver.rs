//! Client provisioning for MySQL

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use mysql_async::{Opts, OptsBuilder, SslOpts};
use tessera_connection::{CacheService, ClientProvisioner, Endpoint};
use tessera_core::{Connection, ConnectionParams, DaoConfig, Result};
use tessera_query::SqlTableDao;

use crate::{MySqlConnection, MySqlDialect};

/// Connects to the endpoint the cache hands out, which is the local end of
/// the SSH tunnel when one is configured
#[derive(Debug, Default)]
pub struct MySqlProvisioner;

impl MySqlProvisioner {
    pub(crate) fn opts(params: &ConnectionParams, endpoint: &Endpoint) -> Opts {
        let database = params.database.as_deref().filter(|d| !d.is_empty());
        let mut builder = OptsBuilder::default()
            .ip_or_hostname(endpoint.host.clone())
            .tcp_port(endpoint.port)
            // A tunnel endpoint is 127.0.0.1, which must not turn into the
            // local server's unix socket
            .prefer_socket(false)
            .user(params.username.as_deref())
            .pass(params.password.as_deref())
            .db_name(database);
        if params.ssl {
            builder = builder.ssl_opts(Self::ssl_opts(params, endpoint.via_tunnel));
        }
        builder.into()
    }

    /// `cert` is a PEM CA certificate, inline or as a file path; without one
    /// the channel is encrypted but the server is not authenticated
    fn ssl_opts(params: &ConnectionParams, via_tunnel: bool) -> SslOpts {
        let ssl = SslOpts::default().with_danger_skip_domain_validation(via_tunnel);
        match params.cert.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(pem) if pem.starts_with("-----BEGIN") => {
                ssl.with_root_certs(vec![pem.as_bytes().to_vec().into()])
            }
            Some(path) => ssl.with_root_certs(vec![PathBuf::from(path).into()]),
            None => ssl
                .with_danger_accept_invalid_certs(true)
                .with_danger_skip_domain_validation(true),
        }
    }
}

#[async_trait]
impl ClientProvisioner for MySqlProvisioner {
    #[tracing::instrument(skip_all, fields(host = %endpoint.host, port = endpoint.port, tunnel = endpoint.via_tunnel))]
    async fn connect(
        &self,
        params: &ConnectionParams,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn Connection>> {
        let opts = Self::opts(params, endpoint);
        Ok(Arc::new(MySqlConnection::connect(opts).await?))
    }
}

/// Table DAO for a MySQL database
pub fn mysql_dao(params: ConnectionParams, caches: Arc<CacheService>, config: DaoConfig) -> SqlTableDao {
    let dialect = MySqlDialect::new(&config);
    SqlTableDao::new(params, Arc::new(dialect), Arc::new(MySqlProvisioner), caches, config)
}
