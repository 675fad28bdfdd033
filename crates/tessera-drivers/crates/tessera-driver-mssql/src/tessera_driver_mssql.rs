//! MS SQL Server adapter: a tiberius client and the T-SQL dialect of the
//! relational DAO

mod connection;
mod dialect;
mod driver;
mod schema;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod dialect_tests;

pub use connection::MssqlConnection;
pub use dialect::MssqlDialect;
pub use driver::{MssqlProvisioner, mssql_dao};
