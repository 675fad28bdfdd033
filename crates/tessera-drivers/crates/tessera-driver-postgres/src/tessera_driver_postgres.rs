//! PostgreSQL adapter: a tokio-postgres client and the PostgreSQL dialect
//! of the relational DAO

mod connection;
mod dialect;
mod driver;
mod schema;
mod tls;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod dialect_tests;

pub use connection::{PostgresCancelHandle, PostgresConnection};
pub use dialect::PostgresDialect;
pub use driver::{PostgresProvisioner, postgres_dao};
