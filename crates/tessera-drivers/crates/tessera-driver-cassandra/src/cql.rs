//! CQL statement text.
//!
//! Names are double-quoted identifiers. Every value is a JSON document in a
//! single-quoted literal, either a whole row (`INSERT ... JSON`) or one
//! cell (`fromJson`), so the engine does the type conversion.

use serde_json::Value as Json;
use tessera_core::sanitize::{quote_doubled_literal, quote_identifier, quote_qualified};
use tessera_core::{DaoError, Result, RowRecord};

/// A table inside its keyspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CqlTable {
    keyspace: String,
    name: String,
}

impl CqlTable {
    pub(crate) fn new(keyspace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            name: name.into(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn qualified(&self) -> Result<String> {
        quote_qualified(Some(&self.keyspace), &self.name, '"', '"')
    }
}

fn column(name: &str) -> Result<String> {
    quote_identifier(name, '"', '"')
}

/// `fromJson('...')` holding one value
pub(crate) fn from_json(value: &Json) -> Result<String> {
    Ok(format!("fromJson({})", quote_doubled_literal(&value.to_string())?))
}

/// Key naming a column inside a JSON row. Names the engine would fold to
/// lower case must carry their own quotes.
pub(crate) fn json_key(name: &str) -> String {
    let folded = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if folded {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Column name of a key in a `SELECT JSON` row, reversing [`json_key`]
pub(crate) fn column_of_json_key(key: &str) -> String {
    match key.strip_prefix('"').and_then(|k| k.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        None => key.to_string(),
    }
}

fn where_key(key: &RowRecord) -> Result<String> {
    if key.is_empty() {
        return Ok(String::new());
    }
    let terms = key
        .iter()
        .map(|(name, value)| Ok(format!("{} = {}", column(name)?, from_json(value)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(" WHERE {}", terms.join(" AND ")))
}

/// `SELECT JSON` of `columns` (all when empty), optionally narrowed to one
/// primary key and capped
pub(crate) fn select_json(
    table: &CqlTable,
    columns: &[String],
    key: &RowRecord,
    limit: Option<u64>,
) -> Result<String> {
    let selection = if columns.is_empty() {
        "*".to_string()
    } else {
        columns
            .iter()
            .map(|c| column(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ")
    };
    let mut cql = format!(
        "SELECT JSON {} FROM {}{}",
        selection,
        table.qualified()?,
        where_key(key)?
    );
    if let Some(limit) = limit {
        cql.push_str(&format!(" LIMIT {}", limit.max(1)));
    }
    Ok(cql)
}

pub(crate) fn count(table: &CqlTable) -> Result<String> {
    Ok(format!("SELECT COUNT(*) FROM {}", table.qualified()?))
}

/// Insert that refuses to overwrite; columns missing from `row` stay unset
pub(crate) fn insert_json(table: &CqlTable, row: &RowRecord) -> Result<String> {
    let document: serde_json::Map<String, Json> = row
        .iter()
        .map(|(name, value)| (json_key(name), value.clone()))
        .collect();
    Ok(format!(
        "INSERT INTO {} JSON {} DEFAULT UNSET IF NOT EXISTS",
        table.qualified()?,
        quote_doubled_literal(&Json::Object(document).to_string())?
    ))
}

/// Update of an existing row; null clears a cell
pub(crate) fn update(table: &CqlTable, changes: &RowRecord, key: &RowRecord) -> Result<String> {
    if changes.is_empty() {
        return Err(DaoError::Validation("an update needs at least one column".to_string()));
    }
    let assignments = changes
        .iter()
        .map(|(name, value)| Ok(format!("{} = {}", column(name)?, from_json(value)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "UPDATE {} SET {}{} IF EXISTS",
        table.qualified()?,
        assignments.join(", "),
        where_key(key)?
    ))
}

pub(crate) fn delete(table: &CqlTable, key: &RowRecord) -> Result<String> {
    Ok(format!(
        "DELETE FROM {}{} IF EXISTS",
        table.qualified()?,
        where_key(key)?
    ))
}
