//! ClickHouse adapter over the HTTP interface.
//!
//! ClickHouse cannot bind values into arbitrary positions of a statement, so
//! the dialect renders every value as a literal through the sanitization
//! boundary of `tessera-core`.

mod connection;
mod dialect;
mod driver;
mod schema;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod dialect_tests;

pub use connection::ClickHouseConnection;
pub use dialect::ClickHouseDialect;
pub use driver::{ClickHouseProvisioner, clickhouse_dao};
