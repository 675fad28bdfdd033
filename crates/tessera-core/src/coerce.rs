//! Coercion of inbound text and JSON into column-typed values

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

use crate::{CanonicalType, DaoError, Result, Value};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Strictly convert a text cell into a value of the column's type
pub fn coerce_text(text: &str, column_type: CanonicalType) -> Result<Value> {
    let trimmed = text.trim();
    let invalid = |what: &str| {
        DaoError::Validation(format!("\"{}\" is not a valid {}", text, what))
    };

    match column_type {
        CanonicalType::Integer => trimmed
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|_| invalid("integer")),
        CanonicalType::Float => trimmed
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::Float64)
            .ok_or_else(|| invalid("number")),
        CanonicalType::Decimal => {
            if trimmed.parse::<f64>().is_ok_and(f64::is_finite) {
                Ok(Value::Decimal(trimmed.to_string()))
            } else {
                Err(invalid("decimal"))
            }
        }
        CanonicalType::Boolean => parse_bool(trimmed)
            .map(Value::Bool)
            .ok_or_else(|| invalid("boolean")),
        CanonicalType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(Value::Date)
            .or_else(|_| parse_timestamp(trimmed).map(|ts| Value::Date(ts.date())))
            .map_err(|_| invalid("date")),
        CanonicalType::Time => NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
            .map(Value::Time)
            .map_err(|_| invalid("time")),
        CanonicalType::Timestamp => {
            if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
                return Ok(Value::DateTimeUtc(ts.with_timezone(&Utc)));
            }
            parse_timestamp(trimmed)
                .map(Value::DateTime)
                .map_err(|_| invalid("timestamp"))
        }
        CanonicalType::Uuid => Uuid::parse_str(trimmed)
            .map(Value::Uuid)
            .map_err(|_| invalid("uuid")),
        CanonicalType::Json | CanonicalType::Array => serde_json::from_str(trimmed)
            .map(Value::Json)
            .map_err(|_| invalid("JSON document")),
        CanonicalType::String
        | CanonicalType::Text
        | CanonicalType::Binary
        | CanonicalType::Unknown => Ok(Value::String(text.to_string())),
    }
}

/// Leniently convert a JSON operand for a column: strings that parse as the
/// column type are converted, anything else passes through unchanged.
pub fn coerce_json(json: &serde_json::Value, column_type: CanonicalType) -> Value {
    match json {
        serde_json::Value::String(s) if !column_type.is_textual() => {
            coerce_text(s, column_type).unwrap_or_else(|_| Value::String(s.clone()))
        }
        serde_json::Value::Number(_) if column_type == CanonicalType::Decimal => {
            Value::Decimal(json.to_string())
        }
        serde_json::Value::Object(_) | serde_json::Value::Array(_)
            if column_type == CanonicalType::Json =>
        {
            Value::Json(json.clone())
        }
        _ => Value::from_json(json),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    let mut last_err = None;
    for format in DATETIME_FORMATS {
        match NaiveDateTime::parse_from_str(s, format) {
            Ok(ts) => return Ok(ts),
            Err(e) => last_err = Some(e),
        }
    }
    match last_err {
        Some(e) => Err(e),
        None => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"),
    }
}
