//! Keyspace convention and cursor-based key listing
//!
//! A row of table `users` with key `42` is the hash `users:42`.

use std::collections::BTreeSet;

use serde_json::Value as Json;
use tessera_core::{Connection, DaoError, Result, RowRecord, Value};

use crate::connection::{json_text, reply_of};

/// Primary-key column of every table
pub(crate) const KEY_COLUMN: &str = "key";

const SEPARATOR: char = ':';

/// SCAN `COUNT` hint (keys per iteration)
const SCAN_COUNT: i64 = 1000;

/// Escape glob metacharacters so a table name matches literally in `MATCH`
pub(crate) fn escape_glob(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `MATCH` pattern selecting every row of `table`
pub(crate) fn table_pattern(table: &str) -> String {
    format!("{}{}*", escape_glob(table), SEPARATOR)
}

pub(crate) fn row_key(table: &str, key: &str) -> String {
    format!("{}{}{}", table, SEPARATOR, key)
}

/// Row key of `full` within `table`, if it belongs there
pub(crate) fn split_row_key<'a>(table: &str, full: &'a str) -> Option<&'a str> {
    full.strip_prefix(table)?.strip_prefix(SEPARATOR)
}

/// Table a key belongs to; keys without a separator belong to none
pub(crate) fn table_of(full: &str) -> Option<&str> {
    full.split_once(SEPARATOR)
        .map(|(table, _)| table)
        .filter(|table| !table.is_empty())
}

/// Text of a primary-key value; only strings and numbers name a row
pub(crate) fn key_text(value: Option<&Json>) -> Result<String> {
    match value {
        Some(Json::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Json::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(DaoError::Validation(format!(
            "\"{}\" must be a non-empty string or a number, got {}",
            KEY_COLUMN, other
        ))),
        None => Err(DaoError::Validation(format!(
            "Redis rows are addressed by a \"{}\" value",
            KEY_COLUMN
        ))),
    }
}

/// Field/value pairs of an `HGETALL` reply, RESP2 flat array or RESP3 map
pub(crate) fn hash_fields(reply: &Json) -> Result<Vec<(String, Json)>> {
    match reply {
        Json::Null => Ok(Vec::new()),
        Json::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Json::Array(items) if items.len() % 2 == 0 => Ok(items
            .chunks(2)
            .map(|pair| (json_text(&pair[0]), pair[1].clone()))
            .collect()),
        other => Err(DaoError::Driver(format!(
            "Unexpected HGETALL reply: {}",
            other
        ))),
    }
}

/// Record of one row: the key column first, then the hash fields
pub(crate) fn row_record(key: &str, fields: Vec<(String, Json)>) -> RowRecord {
    let mut row = RowRecord::new();
    row.insert(KEY_COLUMN.to_string(), Json::String(key.to_string()));
    for (field, value) in fields {
        if field != KEY_COLUMN {
            row.insert(field, value);
        }
    }
    row
}

/// Next cursor and the keys of one `SCAN` page
pub(crate) fn scan_page(reply: &Json) -> Result<(String, Vec<String>)> {
    let malformed = || DaoError::Driver(format!("Unexpected SCAN reply: {}", reply));
    let Json::Array(parts) = reply else {
        return Err(malformed());
    };
    let [cursor, Json::Array(keys)] = parts.as_slice() else {
        return Err(malformed());
    };
    Ok((json_text(cursor), keys.iter().map(json_text).collect()))
}

/// Hash keys matching `pattern`, sorted and de-duplicated.
///
/// Iterates with `SCAN` until the cursor returns to 0, or until `limit`
/// distinct keys were seen.
pub(crate) async fn scan_keys(
    conn: &dyn Connection,
    pattern: &str,
    limit: Option<usize>,
) -> Result<Vec<String>> {
    let mut keys = BTreeSet::new();
    let mut cursor = "0".to_string();
    loop {
        let args = [
            Value::String(cursor),
            Value::String("MATCH".into()),
            Value::String(pattern.to_string()),
            Value::String("COUNT".into()),
            Value::Int64(SCAN_COUNT),
            Value::String("TYPE".into()),
            Value::String("hash".into()),
        ];
        let result = conn.query("SCAN", &args).await?;
        let (next, page) = scan_page(&reply_of(&result))?;
        keys.extend(page);

        if limit.is_some_and(|limit| keys.len() >= limit) || next == "0" {
            break;
        }
        cursor = next;
    }
    tracing::debug!(pattern, keys = keys.len(), "scan completed");

    let mut keys: Vec<String> = keys.into_iter().collect();
    if let Some(limit) = limit {
        keys.truncate(limit);
    }
    Ok(keys)
}

/// Fields of the hash at `key`; `None` when the key does not exist
pub(crate) async fn load_hash(conn: &dyn Connection, key: &str) -> Result<Option<Vec<(String, Json)>>> {
    let result = conn.query("HGETALL", &[Value::String(key.to_string())]).await?;
    let fields = hash_fields(&reply_of(&result))?;
    Ok((!fields.is_empty()).then_some(fields))
}

pub(crate) async fn exists(conn: &dyn Connection, key: &str) -> Result<bool> {
    let result = conn.execute("EXISTS", &[Value::String(key.to_string())]).await?;
    Ok(result.affected_rows > 0)
}
