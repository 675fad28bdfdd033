//! Catalog queries over INFORMATION_SCHEMA and the sys views

use tessera_core::{
    Connection, DatabaseType, ForeignKey, PrimaryKey, ReferencedTableNamesAndColumns, Result,
    TableDs, TableStructure, Value, normalize_type,
};
use tessera_query::rows::{flag, opt_i64, opt_text, text};

const COLUMNS_SQL: &str = "SELECT
        col.COLUMN_NAME AS column_name,
        col.DATA_TYPE AS data_type,
        col.IS_NULLABLE AS is_nullable,
        col.COLUMN_DEFAULT AS column_default,
        CAST(col.CHARACTER_MAXIMUM_LENGTH AS bigint) AS character_maximum_length,
        CAST(col.NUMERIC_PRECISION AS int) AS numeric_precision,
        CAST(col.NUMERIC_SCALE AS int) AS numeric_scale,
        COLUMNPROPERTY(
            OBJECT_ID(QUOTENAME(col.TABLE_SCHEMA) + '.' + QUOTENAME(col.TABLE_NAME)),
            col.COLUMN_NAME,
            'IsIdentity'
        ) AS is_identity
     FROM INFORMATION_SCHEMA.COLUMNS col
     WHERE col.TABLE_SCHEMA = @P1 AND col.TABLE_NAME = @P2
     ORDER BY col.ORDINAL_POSITION";

const PRIMARY_KEYS_SQL: &str = "SELECT
        kcu.COLUMN_NAME AS column_name,
        col.DATA_TYPE AS data_type
     FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
     JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
       ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
      AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
      AND tc.TABLE_NAME = kcu.TABLE_NAME
     JOIN INFORMATION_SCHEMA.COLUMNS col
       ON col.TABLE_SCHEMA = kcu.TABLE_SCHEMA
      AND col.TABLE_NAME = kcu.TABLE_NAME
      AND col.COLUMN_NAME = kcu.COLUMN_NAME
     WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
       AND tc.TABLE_SCHEMA = @P1
       AND tc.TABLE_NAME = @P2
     ORDER BY kcu.ORDINAL_POSITION";

const FOREIGN_KEYS_SQL: &str = "SELECT
        fk.name AS constraint_name,
        COL_NAME(fkc.parent_object_id, fkc.parent_column_id) AS column_name,
        OBJECT_NAME(fkc.referenced_object_id) AS referenced_table_name,
        COL_NAME(fkc.referenced_object_id, fkc.referenced_column_id) AS referenced_column_name
     FROM sys.foreign_keys fk
     JOIN sys.foreign_key_columns fkc ON fk.object_id = fkc.constraint_object_id
     JOIN sys.tables t ON fk.parent_object_id = t.object_id
     JOIN sys.schemas s ON t.schema_id = s.schema_id
     WHERE s.name = @P1 AND t.name = @P2
     ORDER BY fk.name, fkc.constraint_column_id";

const REFERENCING_SQL: &str = "SELECT
        COL_NAME(fkc.referenced_object_id, fkc.referenced_column_id) AS referenced_on,
        t.name AS table_name,
        COL_NAME(fkc.parent_object_id, fkc.parent_column_id) AS column_name
     FROM sys.foreign_key_columns fkc
     JOIN sys.foreign_keys fk ON fk.object_id = fkc.constraint_object_id
     JOIN sys.tables t ON t.object_id = fkc.parent_object_id
     JOIN sys.tables ref_t ON ref_t.object_id = fkc.referenced_object_id
     JOIN sys.schemas rs ON rs.schema_id = ref_t.schema_id
     WHERE rs.name = @P1 AND ref_t.name = @P2
     ORDER BY t.name, fk.name, fkc.constraint_column_id";

const TABLES_SQL: &str = "SELECT
        TABLE_NAME AS table_name,
        TABLE_TYPE AS table_type
     FROM INFORMATION_SCHEMA.TABLES
     WHERE TABLE_SCHEMA = @P1
     ORDER BY TABLE_NAME";

/// Row count of the heap or clustered index; NULL for views
pub(crate) const ESTIMATE_SQL: &str = "SELECT SUM(p.rows) AS estimate
     FROM sys.partitions p
     JOIN sys.tables t ON t.object_id = p.object_id
     JOIN sys.schemas s ON s.schema_id = t.schema_id
     WHERE p.index_id IN (0, 1) AND s.name = @P1 AND t.name = @P2";

pub(crate) fn key(schema: &str, table: &str) -> [Value; 2] {
    [
        Value::String(schema.to_string()),
        Value::String(table.to_string()),
    ]
}

pub(crate) async fn table_structure(
    conn: &dyn Connection,
    schema: &str,
    table: &str,
) -> Result<Vec<TableStructure>> {
    let result = conn.query(COLUMNS_SQL, &key(schema, table)).await?;

    Ok(result
        .rows
        .iter()
        .map(|row| {
            let data_type = text(row, "data_type");
            let mut column = TableStructure::new(
                text(row, "column_name"),
                normalize_type(DatabaseType::Mssql, &data_type),
                data_type,
            );
            column.column_default = opt_text(row, "column_default");
            column.allow_null = text(row, "is_nullable") == "YES";
            // (max) types report -1
            column.character_maximum_length =
                opt_i64(row, "character_maximum_length").filter(|len| *len >= 0);
            column.numeric_precision = opt_i64(row, "numeric_precision").map(|p| p as i32);
            column.numeric_scale = opt_i64(row, "numeric_scale").map(|s| s as i32);
            column.is_auto_increment = flag(row, "is_identity");
            column
        })
        .collect())
}

pub(crate) async fn primary_keys(
    conn: &dyn Connection,
    schema: &str,
    table: &str,
) -> Result<Vec<PrimaryKey>> {
    let result = conn.query(PRIMARY_KEYS_SQL, &key(schema, table)).await?;
    Ok(result
        .rows
        .iter()
        .map(|row| PrimaryKey {
            column_name: text(row, "column_name"),
            data_type: normalize_type(DatabaseType::Mssql, &text(row, "data_type")),
        })
        .collect())
}

pub(crate) async fn foreign_keys(
    conn: &dyn Connection,
    schema: &str,
    table: &str,
) -> Result<Vec<ForeignKey>> {
    let result = conn.query(FOREIGN_KEYS_SQL, &key(schema, table)).await?;
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
    schema: &str,
    table: &str,
) -> Result<Vec<ReferencedTableNamesAndColumns>> {
    let result = conn.query(REFERENCING_SQL, &key(schema, table)).await?;
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

pub(crate) async fn tables(conn: &dyn Connection, schema: &str) -> Result<Vec<TableDs>> {
    let result = conn
        .query(TABLES_SQL, &[Value::String(schema.to_string())])
        .await?;
    Ok(result
        .rows
        .iter()
        .map(|row| TableDs {
            table_name: text(row, "table_name"),
            is_view: text(row, "table_type") == "VIEW",
        })
        .collect())
}
