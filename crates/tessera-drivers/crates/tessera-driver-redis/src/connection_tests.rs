//! Tests for command building, reply conversion and provisioning

use super::*;
use crate::connection::{build_command, command_error, reply_records, reply_to_json};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use tessera_connection::Endpoint;
use tessera_core::{ConnectionParams, DaoError, DatabaseType, Value};

fn packed(text: &str, params: &[Value]) -> String {
    let (_, cmd) = build_command(text, params).unwrap();
    String::from_utf8(cmd.get_packed_command()).unwrap()
}

#[test]
fn test_command_words_then_params() {
    let (name, _) = build_command("hget users:1", &[]).unwrap();
    assert_eq!(name, "HGET");
    assert_eq!(
        packed("hget users:1", &[Value::String("full name".into())]),
        "*3\r\n$4\r\nHGET\r\n$7\r\nusers:1\r\n$9\r\nfull name\r\n"
    );
}

#[test]
fn test_param_encoding() {
    assert_eq!(
        packed("SET", &[Value::Bool(true), Value::Int64(42), Value::Null]),
        "*4\r\n$3\r\nSET\r\n$1\r\n1\r\n$2\r\n42\r\n$0\r\n\r\n"
    );
}

#[test]
fn test_empty_command_rejected() {
    let err = build_command("   ", &[]).err().unwrap();
    assert!(matches!(err, DaoError::Validation(_)));
}

#[rstest]
#[case::nil(redis::Value::Nil, json!(null))]
#[case::int(redis::Value::Int(5), json!(5))]
#[case::bulk(redis::Value::BulkString(b"abc".to_vec()), json!("abc"))]
#[case::okay(redis::Value::Okay, json!("OK"))]
#[case::double(redis::Value::Double(1.5), json!(1.5))]
#[case::boolean(redis::Value::Boolean(true), json!(true))]
#[case::array(
    redis::Value::Array(vec![
        redis::Value::BulkString(b"name".to_vec()),
        redis::Value::BulkString(b"Alice".to_vec()),
    ]),
    json!(["name", "Alice"])
)]
#[case::map(
    redis::Value::Map(vec![(redis::Value::BulkString(b"age".to_vec()), redis::Value::Int(30))]),
    json!({"age": 30})
)]
fn test_reply_to_json(#[case] reply: redis::Value, #[case] expected: serde_json::Value) {
    assert_eq!(reply_to_json(&reply), expected);
}

#[test]
fn test_reply_records_shapes() {
    assert!(reply_records(&json!(null)).is_empty());

    let rows = reply_records(&json!(["a", "b"]));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("key"), Some(&json!(1)));
    assert_eq!(rows[1].get("value"), Some(&json!("b")));

    let rows = reply_records(&json!({"used_memory": "1024"}));
    assert_eq!(rows[0].get("key"), Some(&json!("used_memory")));

    let rows = reply_records(&json!("PONG"));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("key"), Some(&json!(null)));
}

#[test]
fn test_error_classification() {
    let auth = redis::RedisError::from((redis::ErrorKind::AuthenticationFailed, "invalid password"));
    assert!(matches!(command_error("ctx", auth), DaoError::Connection(_)));

    let reset = redis::RedisError::from(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "reset by peer",
    ));
    assert!(matches!(command_error("ctx", reset), DaoError::Connection(_)));

    let timeout = redis::RedisError::from(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
    assert!(matches!(command_error("ctx", timeout), DaoError::Timeout(_)));

    let wrong = redis::RedisError::from((redis::ErrorKind::TypeError, "not a hash"));
    let err = command_error("Redis command HGETALL failed", wrong);
    assert!(matches!(err, DaoError::Query(ref m) if m.starts_with("Redis command HGETALL failed")));
    assert!(!err.is_connectivity());
}

fn params() -> ConnectionParams {
    ConnectionParams::new(DatabaseType::Redis, "cache.internal").with_port(6380)
}

#[test]
fn test_connection_info_plain() {
    let params = params()
        .with_credentials("app", "p@ss:word/#")
        .with_database("3");
    let info = RedisProvisioner::connection_info(&params, &Endpoint::direct(&params)).unwrap();

    assert!(matches!(&info.addr, redis::ConnectionAddr::Tcp(host, 6380) if host == "cache.internal"));
    assert_eq!(info.redis.db, 3);
    assert_eq!(info.redis.username.as_deref(), Some("app"));
    assert_eq!(info.redis.password.as_deref(), Some("p@ss:word/#"));
}

#[test]
fn test_connection_info_tls_through_tunnel_skips_verification() {
    let mut params = params();
    params.ssl = true;

    let direct = RedisProvisioner::connection_info(&params, &Endpoint::direct(&params)).unwrap();
    assert!(matches!(direct.addr, redis::ConnectionAddr::TcpTls { insecure: false, .. }));

    let tunneled = RedisProvisioner::connection_info(&params, &Endpoint::tunneled(40_001)).unwrap();
    assert!(matches!(tunneled.addr, redis::ConnectionAddr::TcpTls { insecure: true, .. }));
}

#[rstest]
#[case(None, Some(0))]
#[case(Some(""), Some(0))]
#[case(Some("15"), Some(15))]
#[case(Some("cache"), None)]
#[case(Some("-1"), None)]
fn test_database_index(#[case] database: Option<&str>, #[case] expected: Option<i64>) {
    let mut params = params();
    params.database = database.map(str::to_string);
    let index = RedisProvisioner::database_index(&params);
    match expected {
        Some(n) => assert_eq!(index.unwrap(), n),
        None => assert!(matches!(index, Err(DaoError::Configuration(_)))),
    }
}

#[test]
fn test_custom_ca_rejected() {
    let mut params = params();
    params.ssl = true;
    params.cert = Some("/etc/ssl/redis-ca.pem".into());
    let err = RedisProvisioner::connection_info(&params, &Endpoint::direct(&params)).unwrap_err();
    assert!(matches!(err, DaoError::Configuration(_)));
}
