//! Tests for the SQLite catalog queries

use super::*;
use pretty_assertions::assert_eq;
use tessera_core::{CanonicalType, Connection};
use tessera_query::{SqlDialect, TableRef};

async fn fixture() -> SqliteConnection {
    let conn = SqliteConnection::open(":memory:").unwrap();
    for sql in [
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR(64) NOT NULL, \
         balance DECIMAL(10,2) DEFAULT 0, active BOOLEAN, created DATETIME)",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users(id), \
         total REAL)",
        "CREATE TABLE tags (user_id INTEGER, tag TEXT, PRIMARY KEY (user_id, tag))",
        "CREATE VIEW rich AS SELECT * FROM users WHERE balance > 100",
    ] {
        conn.execute(sql, &[]).await.unwrap();
    }
    conn
}

fn table(name: &str) -> TableRef {
    TableRef::new(None, name)
}

#[tokio::test]
async fn test_structure_is_normalized() {
    let conn = fixture().await;
    let structure = SqliteDialect.table_structure(&conn, &table("users")).await.unwrap();

    let names: Vec<_> = structure.iter().map(|c| c.column_name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "balance", "active", "created"]);

    assert_eq!(structure[0].data_type, CanonicalType::Integer);
    assert!(structure[0].is_auto_increment);
    assert!(!structure[0].allow_null);

    assert_eq!(structure[1].character_maximum_length, Some(64));
    assert!(!structure[1].allow_null);

    assert_eq!(structure[2].numeric_precision, Some(10));
    assert_eq!(structure[2].numeric_scale, Some(2));
    assert_eq!(structure[2].column_default.as_deref(), Some("0"));
    assert!(structure[2].allow_null);
}

#[tokio::test]
async fn test_composite_primary_key_is_not_auto_increment() {
    let conn = fixture().await;
    let keys = SqliteDialect.primary_keys(&conn, &table("tags")).await.unwrap();
    let names: Vec<_> = keys.iter().map(|k| k.column_name.as_str()).collect();
    assert_eq!(names, vec!["user_id", "tag"]);

    let structure = SqliteDialect.table_structure(&conn, &table("tags")).await.unwrap();
    assert!(structure.iter().all(|c| !c.is_auto_increment));
}

#[tokio::test]
async fn test_foreign_keys_both_directions() {
    let conn = fixture().await;
    let fks = SqliteDialect.foreign_keys(&conn, &table("orders")).await.unwrap();
    assert_eq!(fks.len(), 1);
    assert_eq!(fks[0].column_name, "user_id");
    assert_eq!(fks[0].referenced_table_name, "users");
    assert_eq!(fks[0].referenced_column_name, "id");

    let referenced = SqliteDialect
        .referencing_columns(&conn, &table("users"))
        .await
        .unwrap();
    assert_eq!(referenced.len(), 1);
    assert_eq!(referenced[0].referenced_on_column_name, "id");
    assert_eq!(referenced[0].referenced_by[0].table_name, "orders");
    assert_eq!(referenced[0].referenced_by[0].column_name, "user_id");
}

#[tokio::test]
async fn test_tables_and_views_sorted() {
    let conn = fixture().await;
    let tables = SqliteDialect.tables(&conn, None).await.unwrap();
    let listed: Vec<_> = tables
        .iter()
        .map(|t| (t.table_name.as_str(), t.is_view))
        .collect();
    assert_eq!(
        listed,
        vec![("orders", false), ("rich", true), ("tags", false), ("users", false)]
    );
}

#[tokio::test]
async fn test_missing_table_has_empty_structure() {
    let conn = fixture().await;
    let structure = SqliteDialect.table_structure(&conn, &table("nope")).await.unwrap();
    assert!(structure.is_empty());
}

#[tokio::test]
async fn test_sparse_rowids_give_no_estimate() {
    let conn = fixture().await;
    conn.execute("INSERT INTO users (id, name) VALUES (1, 'a'), (5000, 'b')", &[])
        .await
        .unwrap();
    assert_eq!(
        SqliteDialect.approximate_count(&conn, &table("users")).await.unwrap(),
        None
    );
}
    assert_eq!(
        SqliteDialect.approximate_count(&conn, &table("users")).await.unwrap(),
        Some(3)
    );
    assert!(SqliteDialect.approximate_count(&conn, &table("nope")).await.is_err());
}
