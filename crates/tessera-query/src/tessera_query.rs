//! Relational side of the DAO layer.
//!
//! One [`SqlTableDao`] serves every SQL engine; the engine-specific parts
//! (quoting, placeholders, pagination syntax, key retrieval, catalog queries)
//! sit behind the [`SqlDialect`] trait that each driver crate implements.

mod dao;
mod dialect;
mod predicate;
mod statement;
#[cfg(test)]
mod testing;

pub use dao::SqlTableDao;
pub use dialect::{InsertKeys, PagingStyle, SqlDialect, TableRef};
pub use predicate::{autocomplete_predicate, filter_predicate, primary_key_predicate, search_predicate};
pub use statement::{SqlBuilder, is_row_returning};

/// Convenience accessors for single-column catalog results
pub mod rows {
    use tessera_core::{QueryResult, Row, Value};

    /// First column of the first row as an unsigned count
    pub fn first_count(result: &QueryResult) -> Option<u64> {
        result
            .rows
            .first()
            .and_then(|row| row.get(0))
            .and_then(value_as_count)
    }

    /// Integer-ish value as a non-negative count; engines report counts as
    /// integers, floats (`reltuples`) or numeric strings
    pub fn value_as_count(value: &Value) -> Option<u64> {
        match value {
            Value::Null => None,
            Value::String(s) | Value::Decimal(s) => s.trim().parse::<f64>().ok().map(|f| f.max(0.0) as u64),
            other => other
                .as_i64()
                .map(|i| i.max(0) as u64)
                .or_else(|| other.as_f64().map(|f| f.max(0.0) as u64)),
        }
    }

    /// Text of a named column, empty when missing or NULL
    pub fn text(row: &Row, column: &str) -> String {
        match row.get_by_name(column) {
            Some(Value::Null) | None => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Optional text of a named column
    pub fn opt_text(row: &Row, column: &str) -> Option<String> {
        match row.get_by_name(column) {
            Some(Value::Null) | None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }

    /// Integer of a named column
    pub fn opt_i64(row: &Row, column: &str) -> Option<i64> {
        match row.get_by_name(column)? {
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            other => other.as_i64(),
        }
    }

    /// Truthy flag: booleans, non-zero numbers and `YES`/`true` strings
    pub fn flag(row: &Row, column: &str) -> bool {
        match row.get_by_name(column) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => {
                matches!(s.to_ascii_lowercase().as_str(), "yes" | "true" | "t" | "1")
            }
            Some(other) => other.as_i64().is_some_and(|i| i != 0),
            None => false,
        }
    }
}
