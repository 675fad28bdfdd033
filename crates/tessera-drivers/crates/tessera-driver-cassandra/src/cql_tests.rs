//! Tests for statement text and catalog ordering

use crate::cql::*;
use crate::schema::{CatalogColumn, column_order, columns_cql, primary_keys, table_structure};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use tessera_core::{CanonicalType, DaoError, RowRecord};

fn record(value: serde_json::Value) -> RowRecord {
    value.as_object().cloned().unwrap()
}

fn users() -> CqlTable {
    CqlTable::new("shop", "users")
}

#[test]
fn test_select_json_whole_table() {
    assert_eq!(
        select_json(&users(), &[], &RowRecord::new(), None).unwrap(),
        r#"SELECT JSON * FROM "shop"."users""#
    );
}

#[test]
fn test_select_json_by_key_with_limit() {
    let columns = vec!["id".to_string(), "Full Name".to_string()];
    let key = record(json!({ "id": 7, "region": "eu" }));
    assert_eq!(
        select_json(&users(), &columns, &key, Some(1)).unwrap(),
        r#"SELECT JSON "id", "Full Name" FROM "shop"."users" WHERE "id" = fromJson('7') AND "region" = fromJson('"eu"') LIMIT 1"#
    );
}

#[test]
fn test_count() {
    assert_eq!(count(&users()).unwrap(), r#"SELECT COUNT(*) FROM "shop"."users""#);
}

#[test]
fn test_insert_quotes_case_sensitive_keys() {
    let row = record(json!({ "id": 1, "Nick": "O'Brien" }));
    assert_eq!(
        insert_json(&users(), &row).unwrap(),
        r#"INSERT INTO "shop"."users" JSON '{"id":1,"\"Nick\"":"O''Brien"}' DEFAULT UNSET IF NOT EXISTS"#
    );
}

#[test]
fn test_update_sets_cells_by_key() {
    let changes = record(json!({ "name": "Bo", "age": null }));
    let key = record(json!({ "id": 1 }));
    assert_eq!(
        update(&users(), &changes, &key).unwrap(),
        r#"UPDATE "shop"."users" SET "name" = fromJson('"Bo"'), "age" = fromJson('null') WHERE "id" = fromJson('1') IF EXISTS"#
    );
}

#[test]
fn test_update_without_changes_is_rejected() {
    let err = update(&users(), &RowRecord::new(), &record(json!({ "id": 1 }))).unwrap_err();
    assert!(matches!(err, DaoError::Validation(_)));
}

#[test]
fn test_delete_is_conditional() {
    assert_eq!(
        delete(&users(), &record(json!({ "id": "a'b" }))).unwrap(),
        r#"DELETE FROM "shop"."users" WHERE "id" = fromJson('"a''b"') IF EXISTS"#
    );
}

#[test]
fn test_identifiers_are_quoted() {
    let table = CqlTable::new("shop", r#"we"ird"#);
    assert_eq!(count(&table).unwrap(), r#"SELECT COUNT(*) FROM "shop"."we""ird""#);
    assert_eq!(table.name(), r#"we"ird"#);
}

#[test]
fn test_control_characters_are_escaped_in_values() {
    assert_eq!(from_json(&json!("a\u{0}b")).unwrap(), r#"fromJson('"a\u0000b"')"#);
}

#[rstest]
#[case("name", "name")]
#[case("user_id2", "user_id2")]
#[case("Name", "\"Name\"")]
#[case("full name", "\"full name\"")]
#[case("2fa", "\"2fa\"")]
fn test_json_keys(#[case] column: &str, #[case] key: &str) {
    assert_eq!(json_key(column), key);
    assert_eq!(column_of_json_key(key), column);
}

#[test]
fn test_catalog_literals_are_doubled() {
    assert_eq!(
        columns_cql("shop", "o'neil").unwrap(),
        "SELECT column_name, type, kind, position FROM system_schema.columns \
         WHERE keyspace_name = 'shop' AND table_name = 'o''neil'"
    );
}

fn catalog(name: &str, native: &str, kind: &str, position: i64) -> CatalogColumn {
    CatalogColumn {
        name: name.to_string(),
        native: native.to_string(),
        kind: kind.to_string(),
        position,
    }
}

#[test]
fn test_key_columns_lead_in_position_order() {
    let mut columns = vec![
        catalog("zeta", "text", "regular", -1),
        catalog("created", "timestamp", "clustering", 0),
        catalog("bucket", "int", "partition_key", 1),
        catalog("alpha", "list<int>", "regular", -1),
        catalog("region", "text", "partition_key", 0),
        catalog("owner", "text", "static", -1),
    ];
    columns.sort_by(column_order);

    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["region", "bucket", "created", "owner", "alpha", "zeta"]);

    let structure = table_structure(&columns);
    assert!(!structure[0].allow_null);
    assert!(!structure[2].allow_null);
    assert!(structure[3].allow_null);
    assert_eq!(structure[4].data_type, CanonicalType::Array);
    assert_eq!(structure[2].udt_name, "timestamp");

    let keys: Vec<String> = primary_keys(&columns).into_iter().map(|k| k.column_name).collect();
    assert_eq!(keys, vec!["region", "bucket", "created"]);
}
