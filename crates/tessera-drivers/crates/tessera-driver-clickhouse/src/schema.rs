//! Catalog queries over ClickHouse's system tables.
//!
//! Names are inlined as quoted literals; the sanitization boundary rejects
//! anything that cannot be quoted safely before a statement is built.

use tessera_core::{
    Connection, DatabaseType, PrimaryKey, Result, TableDs, TableStructure, normalize_type,
    sanitize::quote_string_literal,
};
use tessera_query::rows::{opt_i64, opt_text, text};

fn table_filter(database: &str, table: &str) -> Result<String> {
    Ok(format!(
        "database = {} AND table = {}",
        quote_string_literal(database)?,
        quote_string_literal(table)?
    ))
}

pub(crate) fn estimate_sql(database: &str, table: &str) -> Result<String> {
    // total_rows is NULL for engines that do not track it (views, Memory)
    Ok(format!(
        "SELECT total_rows AS estimate FROM system.tables WHERE database = {} AND name = {}",
        quote_string_literal(database)?,
        quote_string_literal(table)?
    ))
}

pub(crate) fn columns_sql(database: &str, table: &str) -> Result<String> {
    Ok(format!(
        "SELECT name, type, default_kind, default_expression, is_in_primary_key, \
         numeric_precision, numeric_scale \
         FROM system.columns WHERE {} ORDER BY position",
        table_filter(database, table)?
    ))
}

pub(crate) fn primary_keys_sql(database: &str, table: &str) -> Result<String> {
    Ok(format!(
        "SELECT name, type FROM system.columns \
         WHERE {} AND is_in_primary_key = 1 ORDER BY position",
        table_filter(database, table)?
    ))
}

pub(crate) fn tables_sql(database: &str) -> Result<String> {
    Ok(format!(
        "SELECT name, engine FROM system.tables \
         WHERE database = {} AND is_temporary = 0 ORDER BY name",
        quote_string_literal(database)?
    ))
}

/// Whether a native type admits NULL
pub(crate) fn is_nullable(native: &str) -> bool {
    let native = native.trim();
    native.starts_with("Nullable(")
        || native
            .strip_prefix("LowCardinality(")
            .is_some_and(|inner| inner.starts_with("Nullable("))
}

pub(crate) async fn table_structure(
    conn: &dyn Connection,
    database: &str,
    table: &str,
) -> Result<Vec<TableStructure>> {
    let result = conn.query(&columns_sql(database, table)?, &[]).await?;

    Ok(result
        .rows
        .iter()
        .map(|row| {
            let native = text(row, "type");
            let mut column = TableStructure::new(
                text(row, "name"),
                normalize_type(DatabaseType::Clickhouse, &native),
                native.clone(),
            );
            // Only DEFAULT expressions are caller-visible; MATERIALIZED and
            // ALIAS columns cannot be written at all
            column.column_default = match text(row, "default_kind").as_str() {
                "" => None,
                _ => opt_text(row, "default_expression").filter(|d| !d.is_empty()),
            };
            column.allow_null = is_nullable(&native);
            column.numeric_precision = opt_i64(row, "numeric_precision").map(|p| p as i32);
            column.numeric_scale = opt_i64(row, "numeric_scale").map(|s| s as i32);
            column.is_auto_increment = false;
            column
        })
        .collect())
}

pub(crate) async fn primary_keys(
    conn: &dyn Connection,
    database: &str,
    table: &str,
) -> Result<Vec<PrimaryKey>> {
    let result = conn.query(&primary_keys_sql(database, table)?, &[]).await?;
    Ok(result
        .rows
        .iter()
        .filter(|row| !text(row, "name").is_empty())
        .map(|row| PrimaryKey {
            column_name: text(row, "name"),
            data_type: normalize_type(DatabaseType::Clickhouse, &text(row, "type")),
        })
        .collect())
}

pub(crate) async fn tables(conn: &dyn Connection, database: &str) -> Result<Vec<TableDs>> {
    let result = conn.query(&tables_sql(database)?, &[]).await?;
    Ok(result
        .rows
        .iter()
        .map(|row| TableDs {
            table_name: text(row, "name"),
            is_view: text(row, "engine").ends_with("View"),
        })
        .collect())
}

