//! Catalog queries over `system_schema`.
//!
//! The catalog only supports equality on its own primary key, so ordering
//! happens here rather than in the statement.

use std::cmp::Ordering;

use tessera_core::{
    Connection, DatabaseType, PrimaryKey, Result, TableDs, TableStructure, normalize_type,
    sanitize::quote_doubled_literal,
};
use tessera_query::rows::{opt_i64, text};

pub(crate) fn columns_cql(keyspace: &str, table: &str) -> Result<String> {
    Ok(format!(
        "SELECT column_name, type, kind, position FROM system_schema.columns \
         WHERE keyspace_name = {} AND table_name = {}",
        quote_doubled_literal(keyspace)?,
        quote_doubled_literal(table)?
    ))
}

pub(crate) fn tables_cql(keyspace: &str) -> Result<String> {
    Ok(format!(
        "SELECT table_name FROM system_schema.tables WHERE keyspace_name = {}",
        quote_doubled_literal(keyspace)?
    ))
}

pub(crate) fn views_cql(keyspace: &str) -> Result<String> {
    Ok(format!(
        "SELECT view_name FROM system_schema.views WHERE keyspace_name = {}",
        quote_doubled_literal(keyspace)?
    ))
}

/// One row of `system_schema.columns`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CatalogColumn {
    pub name: String,
    pub native: String,
    pub kind: String,
    pub position: i64,
}

impl CatalogColumn {
    fn rank(&self) -> u8 {
        match self.kind.as_str() {
            "partition_key" => 0,
            "clustering" => 1,
            "static" => 2,
            _ => 3,
        }
    }

    pub(crate) fn is_key(&self) -> bool {
        self.rank() < 2
    }
}

/// Partition key, then clustering columns, each by position; the rest by name
pub(crate) fn column_order(a: &CatalogColumn, b: &CatalogColumn) -> Ordering {
    a.rank().cmp(&b.rank()).then_with(|| {
        if a.is_key() {
            a.position.cmp(&b.position)
        } else {
            a.name.cmp(&b.name)
        }
    })
}

pub(crate) async fn catalog_columns(
    conn: &dyn Connection,
    keyspace: &str,
    table: &str,
) -> Result<Vec<CatalogColumn>> {
    let result = conn.query(&columns_cql(keyspace, table)?, &[]).await?;
    let mut columns: Vec<CatalogColumn> = result
        .rows
        .iter()
        .map(|row| CatalogColumn {
            name: text(row, "column_name"),
            native: text(row, "type"),
            kind: text(row, "kind"),
            position: opt_i64(row, "position").unwrap_or(-1),
        })
        .filter(|c| !c.name.is_empty())
        .collect();
    columns.sort_by(column_order);
    Ok(columns)
}

/// Key columns cannot be null; nothing is generated on insert
pub(crate) fn table_structure(columns: &[CatalogColumn]) -> Vec<TableStructure> {
    columns
        .iter()
        .map(|c| {
            let mut column = TableStructure::new(
                c.name.clone(),
                normalize_type(DatabaseType::Cassandra, &c.native),
                c.native.clone(),
            );
            column.allow_null = !c.is_key();
            column
        })
        .collect()
}

pub(crate) fn primary_keys(columns: &[CatalogColumn]) -> Vec<PrimaryKey> {
    columns
        .iter()
        .filter(|c| c.is_key())
        .map(|c| PrimaryKey {
            column_name: c.name.clone(),
            data_type: normalize_type(DatabaseType::Cassandra, &c.native),
        })
        .collect()
}

/// Tables and materialized views of a keyspace, by name
pub(crate) async fn tables(conn: &dyn Connection, keyspace: &str) -> Result<Vec<TableDs>> {
    let tables = conn.query(&tables_cql(keyspace)?, &[]).await?;
    let views = conn.query(&views_cql(keyspace)?, &[]).await?;

    let mut found: Vec<TableDs> = tables
        .rows
        .iter()
        .map(|row| TableDs {
            table_name: text(row, "table_name"),
            is_view: false,
        })
        .chain(views.rows.iter().map(|row| TableDs {
            table_name: text(row, "view_name"),
            is_view: true,
        }))
        .filter(|t| !t.table_name.is_empty())
        .collect();
    found.sort_by(|a, b| a.table_name.cmp(&b.table_name));
    Ok(found)
}
