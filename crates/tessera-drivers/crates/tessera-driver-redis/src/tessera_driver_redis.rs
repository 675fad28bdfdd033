//! Redis adapter.
//!
//! Redis has no tables, so the adapter maps the contract onto a key
//! convention: a table is a key prefix and each row is a hash stored at
//! `{table}:{key}`. The `key` column carries the part after the prefix and
//! is the primary key. Filtering, search and ordering run in memory over
//! the scanned hashes.

mod connection;
mod dao;
mod driver;
mod keys;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod dao_tests;
#[cfg(test)]
mod keys_tests;

pub use connection::RedisConnection;
pub use dao::RedisTableDao;
pub use driver::{RedisProvisioner, redis_dao};
