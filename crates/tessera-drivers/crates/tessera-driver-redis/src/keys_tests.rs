//! Tests for the keyspace convention

use crate::keys::*;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use tessera_core::DaoError;

#[test]
fn test_table_pattern_escapes_glob() {
    assert_eq!(table_pattern("users"), "users:*");
    assert_eq!(table_pattern("a*b?[c]"), r"a\*b\?\[c\]:*");
    assert_eq!(escape_glob(r"back\slash"), r"back\\slash");
}

#[test]
fn test_row_keys() {
    assert_eq!(row_key("users", "42"), "users:42");
    assert_eq!(split_row_key("users", "users:42"), Some("42"));
    assert_eq!(split_row_key("users", "users:a:b"), Some("a:b"));
    assert_eq!(split_row_key("users", "users2:1"), None);
    assert_eq!(split_row_key("users", "orders:1"), None);
}

#[rstest]
#[case("users:1", Some("users"))]
#[case("session:abc:data", Some("session"))]
#[case("plain", None)]
#[case(":orphan", None)]
fn test_table_of(#[case] key: &str, #[case] expected: Option<&str>) {
    assert_eq!(table_of(key), expected);
}

#[test]
fn test_key_text() {
    assert_eq!(key_text(Some(&json!("abc"))).unwrap(), "abc");
    assert_eq!(key_text(Some(&json!(7))).unwrap(), "7");
    assert!(matches!(key_text(Some(&json!(""))), Err(DaoError::Validation(_))));
    assert!(matches!(key_text(Some(&json!(null))), Err(DaoError::Validation(_))));
    assert!(matches!(key_text(None), Err(DaoError::Validation(_))));
}

#[test]
fn test_hash_fields_both_protocols() {
    let flat = hash_fields(&json!(["name", "Alice", "age", "30"])).unwrap();
    assert_eq!(
        flat,
        vec![
            ("name".to_string(), json!("Alice")),
            ("age".to_string(), json!("30")),
        ]
    );

    let map = hash_fields(&json!({"name": "Alice"})).unwrap();
    assert_eq!(map, vec![("name".to_string(), json!("Alice"))]);

    assert!(hash_fields(&json!([])).unwrap().is_empty());
    assert!(matches!(hash_fields(&json!(["dangling"])), Err(DaoError::Driver(_))));
}

#[test]
fn test_row_record_puts_key_first() {
    let row = row_record(
        "7",
        vec![
            ("name".to_string(), json!("Bo")),
            ("key".to_string(), json!("shadowed")),
        ],
    );
    let columns: Vec<_> = row.keys().cloned().collect();
    assert_eq!(columns, vec!["key", "name"]);
    assert_eq!(row.get("key"), Some(&json!("7")));
}

#[test]
fn test_scan_page() {
    let (cursor, keys) = scan_page(&json!(["17", ["users:1", "users:2"]])).unwrap();
    assert_eq!(cursor, "17");
    assert_eq!(keys, vec!["users:1", "users:2"]);

    assert!(matches!(scan_page(&json!(["0"])), Err(DaoError::Driver(_))));
    assert!(matches!(scan_page(&json!("OK")), Err(DaoError::Driver(_))));
}
