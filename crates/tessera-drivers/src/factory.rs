//! Selects the engine adapter for a set of connection parameters

use std::sync::Arc;

use serde_json::Value as Json;
use tessera_connection::CacheService;
use tessera_core::{ConnectionParams, DaoConfig, DaoError, DatabaseType, Result, TableDao};


/// Builds table DAOs that share one cache service.
///
/// Create one at process start next to the [`CacheService`]; adapters are
/// cheap and hold no connection until their first operation.
pub struct DaoFactory {
    caches: Arc<CacheService>,
    config: DaoConfig,
}

impl DaoFactory {
    pub fn new(caches: Arc<CacheService>, config: DaoConfig) -> Self {
        Self { caches, config }
    }

    pub fn caches(&self) -> &Arc<CacheService> {
        &self.caches
    }

    pub fn config(&self) -> &DaoConfig {
        &self.config
    }

    /// Engines compiled into this build
    pub fn enabled_engines() -> Vec<DatabaseType> {
        let mut engines = Vec::new();
        #[cfg(feature = "postgres")]
        engines.push(DatabaseType::Postgres);
        #[cfg(feature = "mysql")]
        engines.push(DatabaseType::Mysql);
        #[cfg(feature = "mssql")]
        engines.push(DatabaseType::Mssql);
        #[cfg(feature = "sqlite")]
        engines.push(DatabaseType::Sqlite);
        #[cfg(feature = "clickhouse")]
        engines.push(DatabaseType::Clickhouse);
        #[cfg(feature = "cassandra")]
        engines.push(DatabaseType::Cassandra);
        #[cfg(feature = "redis")]
        engines.push(DatabaseType::Redis);
        engines
    }

    /// The adapter for `params.database_type`
    pub fn create(&self, params: ConnectionParams) -> Result<Arc<dyn TableDao>> {
        let database_type = params.database_type;
        tracing::debug!(engine = %database_type, host = %params.host, "creating table dao");

        let caches = self.caches.clone();
        let config = self.config.clone();
        #[allow(unreachable_patterns)]
        let dao: Arc<dyn TableDao> = match database_type {
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => Arc::new(crate::postgres::postgres_dao(params, caches, config)),
            #[cfg(feature = "mysql")]
            DatabaseType::Mysql => Arc::new(crate::mysql::mysql_dao(params, caches, config)),
            #[cfg(feature = "mssql")]
            DatabaseType::Mssql => Arc::new(crate::mssql::mssql_dao(params, caches, config)),
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => Arc::new(crate::sqlite::sqlite_dao(params, caches, config)),
            #[cfg(feature = "clickhouse")]
            DatabaseType::Clickhouse => {
                Arc::new(crate::clickhouse::clickhouse_dao(params, caches, config))
            }
            #[cfg(feature = "cassandra")]
            DatabaseType::Cassandra => {
                Arc::new(crate::cassandra::cassandra_dao(params, caches, config))
            }
            #[cfg(feature = "redis")]
            DatabaseType::Redis => Arc::new(crate::redis::redis_dao(params, caches, config)),
            other => {
                tracing::warn!(engine = %other, "engine not compiled into this build");
                return Err(DaoError::Configuration(format!(
                    "The {} adapter is not enabled in this build",
                    other
                )));
            }
        };
        Ok(dao)
    }

    /// Parse inbound JSON parameters and create their adapter.
    ///
    /// The `type` field accepts the aliases [`DatabaseType`] parses
    /// (`postgresql`, `mariadb`, ...); anything unknown is a configuration
    /// error.
    pub fn create_from_json(&self, raw: &Json) -> Result<Arc<dyn TableDao>> {
        self.create(params_from_json(raw)?)
    }

    /// Close every cached client and tunnel
    pub async fn shutdown(&self) {
        tracing::info!("shutting down table dao caches");
        self.caches.shutdown().await;
    }
}

pub(crate) fn params_from_json(raw: &Json) -> Result<ConnectionParams> {
    let mut raw = raw.clone();
    let Some(object) = raw.as_object_mut() else {
        return Err(DaoError::Configuration(
            "connection parameters must be a JSON object".to_string(),
        ));
    };
    let database_type: DatabaseType = object
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| {
            DaoError::Configuration("connection parameters lack a \"type\"".to_string())
        })?
        .parse()?;
    object.insert("type".to_string(), Json::from(database_type.as_str()));

    serde_json::from_value(raw)
        .map_err(|e| DaoError::Configuration(format!("Invalid connection parameters: {}", e)))
}
