//! Sanitization boundary for identifiers and literals.
//!
//! Every piece of caller input that ends up inside SQL text passes through
//! here. Engines that bind parameters only use the identifier half; engines
//! that cannot bind (ClickHouse over HTTP, Cassandra statements built
//! around `fromJson`) also render literals here.

use crate::{DaoError, Result, Value};

const MAX_IDENTIFIER_LEN: usize = 128;

/// Reject identifiers that cannot be safely quoted
pub fn validate_identifier(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(DaoError::UnsafeInput("empty identifier".to_string()));
    }
    if name.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(DaoError::UnsafeInput(format!(
            "identifier longer than {} characters",
            MAX_IDENTIFIER_LEN
        )));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(DaoError::UnsafeInput(format!(
            "identifier {:?} contains control characters",
            name
        )));
    }
    Ok(name)
}

/// Quote an identifier, doubling the closing quote character
pub fn quote_identifier(name: &str, open: char, close: char) -> Result<String> {
    let name = validate_identifier(name)?;
    let doubled: String = [close, close].iter().collect();
    Ok(format!(
        "{}{}{}",
        open,
        name.replace(close, &doubled),
        close
    ))
}

/// Quote a possibly schema-qualified name (`schema.table`) part by part
pub fn quote_qualified(schema: Option<&str>, name: &str, open: char, close: char) -> Result<String> {
    match schema {
        Some(schema) if !schema.is_empty() => Ok(format!(
            "{}.{}",
            quote_identifier(schema, open, close)?,
            quote_identifier(name, open, close)?
        )),
        _ => quote_identifier(name, open, close),
    }
}

/// Escape `%`, `_` and the escape character for use inside a LIKE pattern
pub fn escape_like(value: &str, escape: char) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '%' || c == '_' || c == escape {
            out.push(escape);
        }
        out.push(c);
    }
    out
}

/// Render a string literal in single quotes with backslash escaping
pub fn quote_string_literal(value: &str) -> Result<String> {
    if value.contains('\0') {
        return Err(DaoError::UnsafeInput(
            "string literal contains a NUL byte".to_string(),
        ));
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    Ok(out)
}

/// Render a string literal in single quotes, doubling embedded quotes.
///
/// This is the CQL form; a backslash has no special meaning there.
pub fn quote_doubled_literal(value: &str) -> Result<String> {
    if value.contains('\0') {
        return Err(DaoError::UnsafeInput(
            "string literal contains a NUL byte".to_string(),
        ));
    }
    Ok(format!("'{}'", value.replace('\'', "''")))
}

/// Render a value as an inline SQL literal
pub fn render_literal(value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        Value::Int8(_) | Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => {
            Ok(value.to_string())
        }
        Value::Float32(_) | Value::Float64(_) => {
            let f = value.as_f64().unwrap_or(f64::NAN);
            if f.is_finite() {
                Ok(format!("{}", f))
            } else {
                Err(DaoError::UnsafeInput(format!(
                    "non-finite number {} cannot be inlined",
                    f
                )))
            }
        }
        Value::Decimal(d) => {
            if d.parse::<f64>().is_ok_and(f64::is_finite) {
                Ok(d.clone())
            } else {
                Err(DaoError::UnsafeInput(format!("invalid decimal {:?}", d)))
            }
        }
        Value::Bytes(bytes) => Ok(format!("unhex('{}')", hex::encode(bytes))),
        Value::Array(items) => {
            let rendered: Result<Vec<String>> = items.iter().map(render_literal).collect();
            Ok(format!("[{}]", rendered?.join(", ")))
        }
        Value::Json(json) => quote_string_literal(&json.to_string()),
        other => match other.to_json() {
            serde_json::Value::String(s) => quote_string_literal(&s),
            json => quote_string_literal(&json.to_string()),
        },
    }
}
