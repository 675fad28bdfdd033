//! Catalog queries over SQLite's table-valued pragmas

use tessera_core::{
    CanonicalType, Connection, DatabaseType, ForeignKey, PrimaryKey,
    ReferencedTableNamesAndColumns, Result, TableDs, TableStructure, Value, normalize_type,
};
use tessera_query::rows::{flag, opt_i64, opt_text, text};

const TABLE_INFO_SQL: &str =
    "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid";

const FOREIGN_KEYS_SQL: &str = "SELECT id, \"from\", \"table\", \"to\" \
     FROM pragma_foreign_key_list(?1) ORDER BY id, seq";

const REFERENCING_SQL: &str = "SELECT f.\"to\" AS referenced_on, m.name AS table_name, f.\"from\" AS column_name \
     FROM sqlite_master m JOIN pragma_foreign_key_list(m.name) f \
     WHERE m.type = 'table' AND f.\"table\" = ?1 \
     ORDER BY m.name, f.id, f.seq";

const TABLES_SQL: &str = "SELECT name, type FROM sqlite_master \
     WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
     ORDER BY name";

/// `VARCHAR(255)` -> length 255, `DECIMAL(10,2)` -> precision 10, scale 2
fn type_modifiers(declared: &str) -> (Option<i64>, Option<i32>, Option<i32>) {
    let Some(args) = declared
        .split_once('(')
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(args, _)| args)
    else {
        return (None, None, None);
    };
    let mut parts = args.split(',').map(|p| p.trim().parse::<i32>().ok());
    let first = parts.next().flatten();
    let second = parts.next().flatten();
    match normalize_type(DatabaseType::Sqlite, declared) {
        CanonicalType::Decimal | CanonicalType::Float => (None, first, second),
        _ => (first.map(i64::from), None, None),
    }
}

pub(crate) async fn table_structure(conn: &dyn Connection, table: &str) -> Result<Vec<TableStructure>> {
    let result = conn
        .query(TABLE_INFO_SQL, &[Value::String(table.to_string())])
        .await?;

    let pk_columns = result
        .rows
        .iter()
        .filter(|r| opt_i64(r, "pk").unwrap_or(0) > 0)
        .count();

    Ok(result
        .rows
        .iter()
        .map(|row| {
            let declared = text(row, "type");
            let is_pk = opt_i64(row, "pk").unwrap_or(0) > 0;
            let (length, precision, scale) = type_modifiers(&declared);
            let mut column = TableStructure::new(
                text(row, "name"),
                normalize_type(DatabaseType::Sqlite, &declared),
                declared.clone(),
            );
            column.column_default = opt_text(row, "dflt_value");
            column.allow_null = !flag(row, "notnull") && !is_pk;
            column.character_maximum_length = length;
            column.numeric_precision = precision;
            column.numeric_scale = scale;
            // A lone INTEGER PRIMARY KEY aliases the rowid
            column.is_auto_increment =
                is_pk && pk_columns == 1 && declared.eq_ignore_ascii_case("integer");
            column
        })
        .collect())
}

pub(crate) async fn primary_keys(conn: &dyn Connection, table: &str) -> Result<Vec<PrimaryKey>> {
    let result = conn
        .query(TABLE_INFO_SQL, &[Value::String(table.to_string())])
        .await?;

    let mut keys: Vec<(i64, PrimaryKey)> = result
        .rows
        .iter()
        .filter_map(|row| {
            let position = opt_i64(row, "pk").filter(|p| *p > 0)?;
            Some((
                position,
                PrimaryKey {
                    column_name: text(row, "name"),
                    data_type: normalize_type(DatabaseType::Sqlite, &text(row, "type")),
                },
            ))
        })
        .collect();
    keys.sort_by_key(|(position, _)| *position);
    Ok(keys.into_iter().map(|(_, key)| key).collect())
}

pub(crate) async fn foreign_keys(conn: &dyn Connection, table: &str) -> Result<Vec<ForeignKey>> {
    let result = conn
        .query(FOREIGN_KEYS_SQL, &[Value::String(table.to_string())])
        .await?;

    // SQLite does not keep constraint names
    Ok(result
        .rows
        .iter()
        .map(|row| ForeignKey {
            column_name: text(row, "from"),
            constraint_name: format!("fk_{}_{}", table, opt_i64(row, "id").unwrap_or(0)),
            referenced_table_name: text(row, "table"),
            referenced_column_name: text(row, "to"),
        })
        .collect())
}

pub(crate) async fn referencing_columns(
    conn: &dyn Connection,
    table: &str,
) -> Result<Vec<ReferencedTableNamesAndColumns>> {
    let result = conn
        .query(REFERENCING_SQL, &[Value::String(table.to_string())])
        .await?;

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

pub(crate) async fn tables(conn: &dyn Connection) -> Result<Vec<TableDs>> {
    let result = conn.query(TABLES_SQL, &[]).await?;
    Ok(result
        .rows
        .iter()
        .map(|row| TableDs {
            table_name: text(row, "name"),
            is_view: text(row, "type") == "view",
        })
        .collect())
}
