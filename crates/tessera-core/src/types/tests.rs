use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn test_from_json_numbers_prefer_integers() {
    assert_eq!(Value::from_json(&json!(42)), Value::Int64(42));
    assert_eq!(Value::from_json(&json!(1.5)), Value::Float64(1.5));
    assert_eq!(Value::from_json(&json!(null)), Value::Null);
}

#[test]
fn test_from_json_object_becomes_json_value() {
    let doc = json!({"a": 1});
    assert_eq!(Value::from_json(&doc), Value::Json(doc.clone()));
}

#[test]
fn test_to_json_temporal_values() {
    let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    assert_eq!(Value::Date(date).to_json(), json!("2024-02-29"));

    let ts = date.and_hms_opt(13, 5, 0).unwrap();
    assert_eq!(Value::DateTime(ts).to_json(), json!("2024-02-29T13:05:00"));
}

#[test]
fn test_to_json_nan_is_null() {
    assert_eq!(Value::Float64(f64::NAN).to_json(), json!(null));
}

#[test]
fn test_as_i64_accepts_integral_strings() {
    assert_eq!(Value::String("17".into()).as_i64(), Some(17));
    assert_eq!(Value::String("x".into()).as_i64(), None);
    assert_eq!(Value::Float64(3.0).as_i64(), Some(3));
}

#[test]
fn test_row_to_record_keeps_column_order() {
    let row = Row::new(
        vec!["z".into(), "a".into()],
        vec![Value::Int32(1), Value::String("x".into())],
    );
    let record = row.to_record();
    let keys: Vec<&String> = record.keys().collect();
    assert_eq!(keys, vec!["z", "a"]);
    assert_eq!(record["a"], json!("x"));
}
