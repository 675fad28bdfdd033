//! SQLite adapter: a rusqlite client and the SQLite dialect of the
//! relational DAO

mod connection;
mod dialect;
mod driver;
mod schema;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod dialect_tests;

pub use connection::SqliteConnection;
pub use dialect::SqliteDialect;
pub use driver::{SqliteProvisioner, sqlite_dao};
