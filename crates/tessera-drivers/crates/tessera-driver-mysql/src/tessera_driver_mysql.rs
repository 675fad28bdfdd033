//! MySQL adapter: a mysql_async client and the MySQL dialect of the
//! relational DAO

mod connection;
mod dialect;
mod driver;
mod schema;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod dialect_tests;

pub use connection::{MySqlCancelHandle, MySqlConnection};
pub use dialect::MySqlDialect;
pub use driver::{MySqlProvisioner, mysql_dao};
