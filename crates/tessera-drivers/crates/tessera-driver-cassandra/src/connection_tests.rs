//! Tests for value conversion, error classification and provisioning

use super::*;
use crate::connection::{APPLIED_COLUMN, applied, cql_to_value, query_error};
use pretty_assertions::assert_eq;
use rstest::rstest;
use scylla::frame::response::result::CqlValue;
use scylla::statement::Consistency;
use scylla::transport::errors::{DbError, QueryError};
use serde_json::json;
use tessera_connection::Endpoint;
use tessera_core::{ConnectionParams, DaoError, DatabaseType, QueryResult, Row, Value};

#[rstest]
#[case(None, Value::Null)]
#[case(Some(CqlValue::Empty), Value::Null)]
#[case(Some(CqlValue::Text("hi".into())), Value::String("hi".into()))]
#[case(Some(CqlValue::Int(7)), Value::Int32(7))]
#[case(Some(CqlValue::BigInt(-3)), Value::Int64(-3))]
#[case(Some(CqlValue::Boolean(true)), Value::Bool(true))]
#[case(
    Some(CqlValue::List(vec![CqlValue::Int(1), CqlValue::Int(2)])),
    Value::Array(vec![Value::Int32(1), Value::Int32(2)])
)]
fn test_cells_map_onto_values(#[case] cell: Option<CqlValue>, #[case] expected: Value) {
    assert_eq!(cql_to_value(cell), expected);
}

fn conditional(outcome: Value) -> QueryResult {
    let mut result = QueryResult::empty();
    result.rows = vec![Row::new(vec![APPLIED_COLUMN.to_string()], vec![outcome])];
    result
}

#[test]
fn test_applied_column() {
    assert_eq!(applied(&conditional(Value::Bool(true))), Some(true));
    assert_eq!(applied(&conditional(Value::Bool(false))), Some(false));
    assert_eq!(applied(&QueryResult::empty()), None);
}

#[test]
fn test_error_classification() {
    let syntax = QueryError::DbError(DbError::SyntaxError, "line 1:7 no viable alternative".into());
    assert!(matches!(query_error("ctx", syntax), DaoError::Query(_)));

    let overloaded = QueryError::DbError(DbError::Overloaded, "busy".into());
    assert!(query_error("ctx", overloaded).is_connectivity());

    let timeout = QueryError::DbError(
        DbError::ReadTimeout {
            consistency: Consistency::One,
            received: 0,
            required: 1,
            data_present: false,
        },
        "read timed out".into(),
    );
    assert!(matches!(query_error("ctx", timeout), DaoError::Timeout(_)));
}

fn endpoint(host: &str) -> Endpoint {
    Endpoint {
        host: host.to_string(),
        port: 9042,
        via_tunnel: false,
    }
}

#[test]
fn test_datacenter_comes_from_extras() {
    let params = ConnectionParams::new(DatabaseType::Cassandra, "node1")
        .with_extra("dataCenter", json!(" eu-west "));
    assert_eq!(CassandraProvisioner::datacenter(&params).as_deref(), Some("eu-west"));

    let blank = ConnectionParams::new(DatabaseType::Cassandra, "node1")
        .with_extra("dataCenter", json!(""));
    assert_eq!(CassandraProvisioner::datacenter(&blank), None);
    assert_eq!(
        CassandraProvisioner::datacenter(&ConnectionParams::new(DatabaseType::Cassandra, "node1")),
        None
    );
}

#[rstest]
#[case("10.0.0.5", "10.0.0.5:9042")]
#[case("cassandra.internal", "cassandra.internal:9042")]
#[case("::1", "[::1]:9042")]
fn test_known_node(#[case] host: &str, #[case] expected: &str) {
    assert_eq!(CassandraProvisioner::known_node(&endpoint(host)), expected);
}

#[test]
fn test_tls_is_a_configuration_error() {
    let mut params = ConnectionParams::new(DatabaseType::Cassandra, "node1");
    params.ssl = true;
    let err = CassandraProvisioner::check_settings(&params, &endpoint("node1")).unwrap_err();
    assert!(matches!(err, DaoError::Configuration(_)));
}

#[test]
fn test_tunneled_endpoint_is_accepted() {
    let params = ConnectionParams::new(DatabaseType::Cassandra, "node1");
    let tunneled = Endpoint {
        via_tunnel: true,
        ..endpoint("127.0.0.1")
    };
    assert!(CassandraProvisioner::check_settings(&params, &tunneled).is_ok());
}
