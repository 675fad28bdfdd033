//! Cassandra adapter, also serving ScyllaDB.
//!
//! A table lives in the keyspace named by `database` (or `schema`). Rows
//! travel as JSON: reads use `SELECT JSON` and writes use `INSERT ... JSON`
//! and `fromJson`, so every value is rendered by one literal quoting rule.
//! CQL cannot filter on arbitrary columns, so filters, search and ordering
//! run in memory over the loaded rows.

mod connection;
mod cql;
mod dao;
mod driver;
mod schema;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod cql_tests;
#[cfg(test)]
mod dao_tests;

pub use connection::CassandraConnection;
pub use dao::CassandraTableDao;
pub use driver::{CassandraProvisioner, cassandra_dao};
