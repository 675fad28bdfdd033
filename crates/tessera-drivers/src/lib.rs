//! Tessera Drivers - engine adapters and the factory that picks one
//!
//! Each engine lives in its own crate behind a feature of the same name.
//! [`DaoFactory`] turns `ConnectionParams` into the matching `TableDao`.

// SQL Databases
#[cfg(feature = "mssql")]
pub use tessera_driver_mssql as mssql;
#[cfg(feature = "mysql")]
pub use tessera_driver_mysql as mysql;
#[cfg(feature = "postgres")]
pub use tessera_driver_postgres as postgres;
#[cfg(feature = "sqlite")]
pub use tessera_driver_sqlite as sqlite;

// Analytical, wide-column and key-value
#[cfg(feature = "cassandra")]
pub use tessera_driver_cassandra as cassandra;
#[cfg(feature = "clickhouse")]
pub use tessera_driver_clickhouse as clickhouse;
#[cfg(feature = "redis")]
pub use tessera_driver_redis as redis;

mod factory;

pub use factory::DaoFactory;

/// Re-export commonly used types from tessera-core
pub use tessera_core::{
    AutocompleteFields, ConnectionParams, CsvImportResult, DaoConfig, DaoError, DatabaseType,
    FilterCriteria, FilteringField, FoundRows, Pagination, QueryOrder, Result, RowCount,
    RowRecord, RowsQuery, TableDao, TableSettings, TestConnectionResult,
};
pub use tessera_connection::{CacheConfig, CacheService};
