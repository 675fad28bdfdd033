//! Catalog queries over MySQL's information_schema.
//!
//! Every query resolves a missing schema to the session database with
//! `COALESCE(?, DATABASE())`.

use tessera_core::{
    Connection, DatabaseType, ForeignKey, PrimaryKey, ReferencedTableNamesAndColumns, Result,
    TableDs, TableStructure, Value, normalize_type,
};
use tessera_query::rows::{opt_i64, opt_text, text};

const COLUMNS_SQL: &str = "SELECT
        COLUMN_NAME AS column_name,
        COLUMN_TYPE AS column_type,
        IS_NULLABLE AS is_nullable,
        COLUMN_DEFAULT AS column_default,
        CHARACTER_MAXIMUM_LENGTH AS character_maximum_length,
        NUMERIC_PRECISION AS numeric_precision,
        NUMERIC_SCALE AS numeric_scale,
        EXTRA AS extra
     FROM information_schema.COLUMNS
     WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
     ORDER BY ORDINAL_POSITION";

const PRIMARY_KEYS_SQL: &str = "SELECT
        k.COLUMN_NAME AS column_name,
        c.COLUMN_TYPE AS column_type
     FROM information_schema.KEY_COLUMN_USAGE k
     JOIN information_schema.COLUMNS c
       ON c.TABLE_SCHEMA = k.TABLE_SCHEMA
      AND c.TABLE_NAME = k.TABLE_NAME
      AND c.COLUMN_NAME = k.COLUMN_NAME
     WHERE k.CONSTRAINT_NAME = 'PRIMARY'
       AND k.TABLE_SCHEMA = COALESCE(?, DATABASE())
       AND k.TABLE_NAME = ?
     ORDER BY k.ORDINAL_POSITION";

const FOREIGN_KEYS_SQL: &str = "SELECT
        CONSTRAINT_NAME AS constraint_name,
        COLUMN_NAME AS column_name,
        REFERENCED_TABLE_NAME AS referenced_table_name,
        REFERENCED_COLUMN_NAME AS referenced_column_name
     FROM information_schema.KEY_COLUMN_USAGE
     WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
       AND TABLE_NAME = ?
       AND REFERENCED_TABLE_NAME IS NOT NULL
     ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION";

const REFERENCING_SQL: &str = "SELECT
        REFERENCED_COLUMN_NAME AS referenced_on,
        TABLE_NAME AS table_name,
        COLUMN_NAME AS column_name
     FROM information_schema.KEY_COLUMN_USAGE
     WHERE REFERENCED_TABLE_SCHEMA = COALESCE(?, DATABASE())
       AND REFERENCED_TABLE_NAME = ?
     ORDER BY TABLE_NAME, CONSTRAINT_NAME, ORDINAL_POSITION";

const TABLES_SQL: &str = "SELECT
        TABLE_NAME AS table_name,
        TABLE_TYPE AS table_type
     FROM information_schema.TABLES
     WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
     ORDER BY TABLE_NAME";

/// InnoDB's sampled `TABLE_ROWS`; NULL for views
pub(crate) const ESTIMATE_SQL: &str = "SELECT TABLE_ROWS AS estimate
     FROM information_schema.TABLES
     WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?";

pub(crate) fn table_key(schema: Option<&str>, table: &str) -> [Value; 2] {
    [
        schema.map_or(Value::Null, |s| Value::String(s.to_string())),
        Value::String(table.to_string()),
    ]
}

pub(crate) async fn table_structure(
    conn: &dyn Connection,
    schema: Option<&str>,
    table: &str,
) -> Result<Vec<TableStructure>> {
    let result = conn.query(COLUMNS_SQL, &table_key(schema, table)).await?;

    Ok(result
        .rows
        .iter()
        .map(|row| {
            let column_type = text(row, "column_type");
            let mut column = TableStructure::new(
                text(row, "column_name"),
                normalize_type(DatabaseType::Mysql, &column_type),
                column_type,
            );
            column.column_default = opt_text(row, "column_default");
            column.allow_null = text(row, "is_nullable") == "YES";
            column.character_maximum_length = opt_i64(row, "character_maximum_length");
            column.numeric_precision = opt_i64(row, "numeric_precision").map(|p| p as i32);
            column.numeric_scale = opt_i64(row, "numeric_scale").map(|s| s as i32);
            column.is_auto_increment = text(row, "extra")
                .to_ascii_lowercase()
                .contains("auto_increment");
            column
        })
        .collect())
}

pub(crate) async fn primary_keys(
    conn: &dyn Connection,
    schema: Option<&str>,
    table: &str,
) -> Result<Vec<PrimaryKey>> {
    let result = conn.query(PRIMARY_KEYS_SQL, &table_key(schema, table)).await?;
    Ok(result
        .rows
        .iter()
        .map(|row| PrimaryKey {
            column_name: text(row, "column_name"),
            data_type: normalize_type(DatabaseType::Mysql, &text(row, "column_type")),
        })
        .collect())
}

pub(crate) async fn foreign_keys(
    conn: &dyn Connection,
    schema: Option<&str>,
    table: &str,
) -> Result<Vec<ForeignKey>> {
    let result = conn.query(FOREIGN_KEYS_SQL, &table_key(schema, table)).await?;
    Ok(result
        .rows
        .iter()
        .map(|row| ForeignKey {
            column_name: text(row, "column_name"),
            constraint_name: text(row, "constraint_name"),
            referenced_table_name: text(row, "referenced_table_name"),
            referenced_column_name: text(row, "referenced_column_name"),
        })
        .collect())
}

pub(crate) async fn referencing_columns(
    conn: &dyn Connection,
    schema: Option<&str>,
    table: &str,
) -> Result<Vec<ReferencedTableNamesAndColumns>> {
    let result = conn.query(REFERENCING_SQL, &table_key(schema, table)).await?;
    Ok(ReferencedTableNamesAndColumns::group(result.rows.iter().map(
        |row| {
            (
                text(row, "referenced_on"),
                text(row, "table_name"),
                text(row, "column_name"),
            )
        },
    )))
}

pub(crate) async fn tables(conn: &dyn Connection, schema: Option<&str>) -> Result<Vec<TableDs>> {
    let schema = schema.map_or(Value::Null, |s| Value::String(s.to_string()));
    let result = conn.query(TABLES_SQL, &[schema]).await?;
    Ok(result
        .rows
        .iter()
        .map(|row| TableDs {
            table_name: text(row, "table_name"),
            is_view: text(row, "table_type") == "VIEW",
        })
        .collect())
}
