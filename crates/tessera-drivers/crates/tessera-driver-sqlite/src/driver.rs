//! Client provisioning for SQLite

use std::sync::Arc;

use async_trait::async_trait;
use tessera_connection::{CacheService, ClientProvisioner, Endpoint};
use tessera_core::{Connection, ConnectionParams, DaoConfig, DaoError, Result};
use tessera_query::SqlTableDao;

use crate::{SqliteConnection, SqliteDialect};

/// Opens the database file named by `params.database` (falling back to
/// `host`); the endpoint is meaningless for a local file
#[derive(Debug, Default)]
pub struct SqliteProvisioner;

#[async_trait]
impl ClientProvisioner for SqliteProvisioner {
    #[tracing::instrument(skip_all, fields(path = params.database.as_deref().unwrap_or(&params.host)))]
    async fn connect(
        &self,
        params: &ConnectionParams,
        _endpoint: &Endpoint,
    ) -> Result<Arc<dyn Connection>> {
        let path = params
            .database
            .as_deref()
            .filter(|p| !p.is_empty())
            .or(Some(params.host.as_str()).filter(|h| !h.is_empty()))
            .ok_or_else(|| {
                DaoError::Configuration(
                    "SQLite requires a database path, e.g. { \"database\": \"/path/to/db.sqlite\" }"
                        .into(),
                )
            })?
            .to_string();

        let conn = tokio::task::spawn_blocking(move || SqliteConnection::open(&path))
            .await
            .map_err(|e| DaoError::Driver(format!("SQLite open task failed: {}", e)))??;
        Ok(Arc::new(conn))
    }
}

/// Table DAO for a SQLite database
pub fn sqlite_dao(
    params: ConnectionParams,
    caches: Arc<CacheService>,
    config: DaoConfig,
) -> SqlTableDao {
    SqlTableDao::new(
        params,
        Arc::new(SqliteDialect::new()),
        Arc::new(SqliteProvisioner),
        caches,
        config,
    )
}
