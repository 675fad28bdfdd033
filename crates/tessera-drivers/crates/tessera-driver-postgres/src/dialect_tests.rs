//! Tests for the PostgreSQL statement shapes and catalog mapping

use super::*;
use pretty_assertions::assert_eq;
use schema::{canonical_type, is_generated_default};
use tessera_connection::Endpoint;
use tessera_core::{
    CanonicalType, ConnectionParams, DatabaseType, FilterCriteria, FilteringField, TableStructure,
    Value,
};
use tessera_query::{InsertKeys, SqlBuilder, SqlDialect, TableRef, filter_predicate, search_predicate};

fn structure() -> Vec<TableStructure> {
    vec![
        TableStructure::new("id", CanonicalType::Integer, "int4"),
        TableStructure::new("email", CanonicalType::String, "varchar"),
        TableStructure::new("payload", CanonicalType::Json, "jsonb"),
    ]
}

#[test]
fn test_search_uses_ilike_with_numbered_placeholders() {
    let dialect = PostgresDialect::new();
    let mut builder = SqlBuilder::new(&dialect);
    let fields = vec!["email".to_string(), "id".to_string()];
    let predicate = search_predicate(&mut builder, &fields, &structure(), "Ann_")
        .unwrap()
        .unwrap();

    assert_eq!(
        predicate,
        "(\"email\" ILIKE $1 ESCAPE '\\' OR CAST(\"id\" AS TEXT) ILIKE $2 ESCAPE '\\')"
    );
    assert_eq!(
        builder.params(),
        &[
            Value::String("Ann\\_%".into()),
            Value::String("Ann\\_%".into())
        ]
    );
}

#[test]
fn test_json_comparison_goes_through_text() {
    let dialect = PostgresDialect::new();
    let mut builder = SqlBuilder::new(&dialect);
    let filter = FilteringField::new("payload", FilterCriteria::Eq, serde_json::json!({"a": 1}));
    let predicate = filter_predicate(&mut builder, &filter, &structure())
        .unwrap()
        .unwrap();
    assert_eq!(predicate, "CAST(\"payload\" AS TEXT) = $1");
}

#[test]
fn test_qualified_table_and_default_schema() {
    let dialect = PostgresDialect::new();
    let builder = SqlBuilder::new(&dialect);
    let table = TableRef::new(Some("sales".into()), "orders");
    assert_eq!(builder.table(&table).unwrap(), "\"sales\".\"orders\"");

    let params = ConnectionParams::new(DatabaseType::Postgres, "db");
    assert_eq!(dialect.default_schema(&params).as_deref(), Some("public"));
    let params = params.with_schema("sales");
    assert_eq!(dialect.default_schema(&params).as_deref(), Some("sales"));
    assert_eq!(dialect.insert_keys(), InsertKeys::Returning);
}

#[test]
fn test_catalog_types_are_normalized() {
    assert_eq!(canonical_type("integer", "int4"), CanonicalType::Integer);
    assert_eq!(canonical_type("character varying", "varchar"), CanonicalType::String);
    assert_eq!(canonical_type("timestamp with time zone", "timestamptz"), CanonicalType::Timestamp);
    assert_eq!(canonical_type("ARRAY", "_int4"), CanonicalType::Array);
    assert_eq!(canonical_type("USER-DEFINED", "mood"), CanonicalType::String);
    assert_eq!(canonical_type("USER-DEFINED", "citext"), CanonicalType::String);
    assert_eq!(canonical_type("jsonb", "jsonb"), CanonicalType::Json);
}

#[test]
fn test_serial_defaults_count_as_generated() {
    assert!(is_generated_default(Some("nextval('users_id_seq'::regclass)")));
    assert!(!is_generated_default(Some("now()")));
    assert!(!is_generated_default(None));
}

#[test]
fn test_provisioner_targets_the_endpoint() {
    let params = ConnectionParams::new(DatabaseType::Postgres, "db.internal")
        .with_credentials("app", "secret")
        .with_database("shop");
    let endpoint = Endpoint {
        host: "127.0.0.1".into(),
        port: 40123,
        via_tunnel: true,
    };
    let config = PostgresProvisioner::config(&params, &endpoint);
    assert_eq!(config.get_ports(), &[40123]);
    assert_eq!(config.get_dbname(), Some("shop"));
    assert_eq!(config.get_user(), Some("app"));
    assert_eq!(config.get_password(), Some("secret".as_bytes()));
    assert_eq!(config.get_ssl_mode(), tokio_postgres::config::SslMode::Disable);
}
