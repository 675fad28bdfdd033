//! Catalog queries over information_schema and pg_catalog

use tessera_core::{
    CanonicalType, Connection, DatabaseType, ForeignKey, PrimaryKey,
    ReferencedTableNamesAndColumns, Result, TableDs, TableStructure, Value, normalize_type,
};
use tessera_query::rows::{opt_i64, opt_text, text};

// information_schema columns are domains; casting keeps the wire types plain
const COLUMNS_SQL: &str = "SELECT
        c.column_name::text AS column_name,
        c.data_type::text AS data_type,
        c.udt_name::text AS udt_name,
        c.is_nullable::text AS is_nullable,
        c.column_default::text AS column_default,
        c.character_maximum_length::bigint AS character_maximum_length,
        c.numeric_precision::int AS numeric_precision,
        c.numeric_scale::int AS numeric_scale,
        c.is_identity::text AS is_identity
     FROM information_schema.columns c
     WHERE c.table_schema = $1 AND c.table_name = $2
     ORDER BY c.ordinal_position";

const PRIMARY_KEYS_SQL: &str = "SELECT
        kcu.column_name::text AS column_name,
        c.udt_name::text AS udt_name
     FROM information_schema.table_constraints tc
     JOIN information_schema.key_column_usage kcu
       ON tc.constraint_name = kcu.constraint_name
      AND tc.table_schema = kcu.table_schema
      AND tc.table_name = kcu.table_name
     JOIN information_schema.columns c
       ON c.table_schema = kcu.table_schema
      AND c.table_name = kcu.table_name
      AND c.column_name = kcu.column_name
     WHERE tc.constraint_type = 'PRIMARY KEY'
       AND tc.table_schema = $1
       AND tc.table_name = $2
     ORDER BY kcu.ordinal_position";

// conkey/confkey pair up positionally, which information_schema cannot
// express for composite keys
const FOREIGN_KEYS_SQL: &str = "SELECT
        con.conname::text AS constraint_name,
        att.attname::text AS column_name,
        ref.relname::text AS referenced_table_name,
        ratt.attname::text AS referenced_column_name
     FROM pg_constraint con
     JOIN pg_class rel ON rel.oid = con.conrelid
     JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace
     JOIN pg_class ref ON ref.oid = con.confrelid
     CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, refnum, ord)
     JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.attnum
     JOIN pg_attribute ratt ON ratt.attrelid = con.confrelid AND ratt.attnum = k.refnum
     WHERE con.contype = 'f' AND nsp.nspname = $1 AND rel.relname = $2
     ORDER BY con.conname, k.ord";

const REFERENCING_SQL: &str = "SELECT
        ratt.attname::text AS referenced_on,
        rel.relname::text AS table_name,
        att.attname::text AS column_name
     FROM pg_constraint con
     JOIN pg_class rel ON rel.oid = con.conrelid
     JOIN pg_class ref ON ref.oid = con.confrelid
     JOIN pg_namespace rnsp ON rnsp.oid = ref.relnamespace
     CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, refnum, ord)
     JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.attnum
     JOIN pg_attribute ratt ON ratt.attrelid = con.confrelid AND ratt.attnum = k.refnum
     WHERE con.contype = 'f' AND rnsp.nspname = $1 AND ref.relname = $2
     ORDER BY rel.relname, con.conname, k.ord";

const TABLES_SQL: &str = "SELECT
        table_name::text AS table_name,
        table_type::text AS table_type
     FROM information_schema.tables
     WHERE table_schema = $1
     ORDER BY table_name";

/// `reltuples` is -1 until the first VACUUM or ANALYZE
pub(crate) const ESTIMATE_SQL: &str = "SELECT c.reltuples::bigint AS estimate
     FROM pg_class c
     JOIN pg_namespace n ON n.oid = c.relnamespace
     WHERE n.nspname = $1 AND c.relname = $2";

fn key(schema: &str, table: &str) -> [Value; 2] {
    [
        Value::String(schema.to_string()),
        Value::String(table.to_string()),
    ]
}

/// Canonical type from the `data_type`/`udt_name` pair of information_schema
pub(crate) fn canonical_type(data_type: &str, udt_name: &str) -> CanonicalType {
    match data_type {
        // Enums and domains over text
        "USER-DEFINED" => match normalize_type(DatabaseType::Postgres, udt_name) {
            CanonicalType::Unknown => CanonicalType::String,
            known => known,
        },
        "ARRAY" => CanonicalType::Array,
        _ => normalize_type(DatabaseType::Postgres, udt_name),
    }
}

pub(crate) fn is_generated_default(default: Option<&str>) -> bool {
    default.is_some_and(|d| d.to_ascii_lowercase().contains("nextval("))
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
            let udt_name = text(row, "udt_name");
            let mut column = TableStructure::new(
                text(row, "column_name"),
                canonical_type(&text(row, "data_type"), &udt_name),
                udt_name,
            );
            column.column_default = opt_text(row, "column_default");
            column.allow_null = text(row, "is_nullable") == "YES";
            column.character_maximum_length = opt_i64(row, "character_maximum_length");
            column.numeric_precision = opt_i64(row, "numeric_precision").map(|p| p as i32);
            column.numeric_scale = opt_i64(row, "numeric_scale").map(|s| s as i32);
            column.is_auto_increment = text(row, "is_identity") == "YES"
                || is_generated_default(column.column_default.as_deref());
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
            data_type: normalize_type(DatabaseType::Postgres, &text(row, "udt_name")),
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
