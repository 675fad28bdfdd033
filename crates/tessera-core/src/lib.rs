//! Tessera Core - shared data model and the DAO contract
//!
//! This crate defines what every engine adapter agrees on:
//!
//! - `TableDao` - the uniform data access contract
//! - `Connection` - the engine client trait the caches hold
//! - `ConnectionParams` and its cache `Fingerprint`
//! - The predicate model (`FilterCriteria`, `FilteringField`, `AutocompleteFields`)
//! - The row-count strategy and the sanitization boundary

mod coerce;
mod config;
mod connection;
mod dao;
mod data_types;
mod error;
mod fields;
mod filtering;
pub mod matching;
mod params;
mod row_count;
mod rows;
pub mod sanitize;
mod schema;
pub mod security;
mod settings;
mod types;

pub use coerce::{coerce_json, coerce_text};
pub use config::DaoConfig;
pub use connection::*;
pub use dao::*;
pub use data_types::{CanonicalType, normalize_type};
pub use error::*;
pub use fields::*;
pub use filtering::*;
pub use params::*;
pub use row_count::*;
pub use rows::*;
pub use schema::*;
pub use security::*;
pub use settings::*;
pub use types::*;
