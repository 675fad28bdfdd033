//! PostgreSQL connection implementation

use std::error::Error as StdError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use postgres_native_tls::MakeTlsConnector;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};
use tokio_postgres::{CancelToken, Client, NoTls, Row as PgRow, Statement};
use tessera_core::{
    ColumnMeta, Connection, DaoError, QueryCancelHandle, QueryResult, Result, Row,
    StatementResult, Value,
};

type BoxError = Box<dyn StdError + Sync + Send>;

/// Cancel handle for PostgreSQL queries.
///
/// Wraps the tokio-postgres `CancelToken`; the cancel request travels over a
/// separate connection, so it can be sent while the client lock is held.
pub struct PostgresCancelHandle {
    cancel_token: CancelToken,
}

impl QueryCancelHandle for PostgresCancelHandle {
    fn cancel(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no runtime available to send PostgreSQL cancel request");
            return;
        };
        tracing::debug!("sending cancel request to PostgreSQL server");
        let cancel_token = self.cancel_token.clone();
        runtime.spawn(async move {
            if let Err(e) = cancel_token.cancel_query(NoTls).await {
                tracing::warn!(error = %e, "failed to cancel PostgreSQL query");
            }
        });
    }
}

pub(crate) fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let code = db_error.code();
    let mut message = db_error.message().to_string();

    if let Some(detail) = db_error.detail().filter(|d| !d.trim().is_empty()) {
        message.push_str(&format!(" (detail: {})", detail));
    }
    if let Some(hint) = db_error.hint().filter(|h| !h.trim().is_empty()) {
        message.push_str(&format!(" (hint: {})", hint));
    }
    if let Some(column) = db_error.column().filter(|c| !c.trim().is_empty()) {
        message.push_str(&format!(" (column: {})", column));
    }

    match code.code() {
        "23505" => format!("duplicate value violates unique constraint: {}", message),
        "23503" => format!("foreign key violation: {}", message),
        "23502" => format!("null value violates not-null constraint: {}", message),
        "22007" => format!("invalid datetime format: {}", message),
        "22P02" => format!("invalid input syntax: {}", message),
        other => format!("{} (code: {})", message, other),
    }
}

/// Classify a driver error: a dead socket is a connectivity failure the
/// cache must evict on, a server-side cancel is a timeout or a cancellation
pub(crate) fn query_error(context: &str, error: tokio_postgres::Error) -> DaoError {
    if error.is_closed() {
        return DaoError::Connection(format!("{}: connection closed", context));
    }
    if let Some(db_error) = error.as_db_error() {
        if db_error.code() == &SqlState::QUERY_CANCELED {
            return if db_error.message().contains("statement timeout") {
                DaoError::Timeout(db_error.message().to_string())
            } else {
                DaoError::Cancelled
            };
        }
    } else if error
        .source()
        .is_some_and(|source| source.is::<std::io::Error>())
    {
        return DaoError::Connection(format!("{}: {}", context, error));
    }
    DaoError::Query(format!("{}: {}", context, format_postgres_error(&error)))
}

/// PostgreSQL connection wrapper
pub struct PostgresConnection {
    client: Mutex<Client>,
    cancel_token: CancelToken,
    driver: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl PostgresConnection {
    /// Connect with an already assembled configuration; `tls = None`
    /// connects in plain text
    pub async fn connect(
        config: tokio_postgres::Config,
        tls: Option<MakeTlsConnector>,
    ) -> Result<Self> {
        tracing::info!(
            hosts = ?config.get_hosts(),
            ports = ?config.get_ports(),
            database = ?config.get_dbname(),
            tls = tls.is_some(),
            "connecting to PostgreSQL database"
        );

        let connect_error =
            |e: tokio_postgres::Error| DaoError::Connection(format!("Failed to connect to PostgreSQL: {}", e));
        let (client, driver) = match tls {
            Some(tls) => {
                let (client, connection) = config.connect(tls).await.map_err(connect_error)?;
                (client, spawn_driver(connection))
            }
            None => {
                let (client, connection) = config.connect(NoTls).await.map_err(connect_error)?;
                (client, spawn_driver(connection))
            }
        };

        tracing::info!("PostgreSQL connection established");
        Ok(Self {
            cancel_token: client.cancel_token(),
            client: Mutex::new(client),
            driver: Mutex::new(Some(driver)),
            closed: AtomicBool::new(false),
        })
    }

    async fn prepared(&self, client: &Client, sql: &str, context: &str) -> Result<Statement> {
        if self.is_closed() {
            return Err(DaoError::Connection("PostgreSQL connection is closed".into()));
        }
        client.prepare(sql).await.map_err(|e| query_error(context, e))
    }
}

/// Drive the socket half of the client until it closes
fn spawn_driver<F>(connection: F) -> JoinHandle<()>
where
    F: Future<Output = std::result::Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "PostgreSQL connection error");
        }
    })
}

/// Convert bound values to the parameter types the server inferred
fn bind_params(statement: &Statement, params: &[Value]) -> Vec<PgValue> {
    let param_types = statement.params();
    params
        .iter()
        .enumerate()
        .map(|(i, value)| match param_types.get(i) {
            Some(target_type) => PgValue::from_value_for_type(value, target_type),
            None => PgValue::from_value(value),
        })
        .collect()
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgres"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let client = self.client.lock().await;
        let statement = self
            .prepared(&client, sql, "Failed to prepare statement")
            .await?;

        let pg_params = bind_params(&statement, params);
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let affected_rows = client
            .execute(&statement, &param_refs)
            .await
            .map_err(|e| query_error("Failed to execute statement", e))?;

        tracing::debug!(affected_rows, "statement executed");
        Ok(StatementResult {
            affected_rows,
            last_insert_id: None,
        })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let client = self.client.lock().await;
        let statement = self.prepared(&client, sql, "Failed to prepare query").await?;

        let pg_params = bind_params(&statement, params);
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let pg_rows = client
            .query(&statement, &param_refs)
            .await
            .map_err(|e| query_error("Failed to execute query", e))?;
        drop(client);

        let columns: Vec<ColumnMeta> = statement
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| ColumnMeta {
                name: col.name().to_string(),
                data_type: col.type_().name().to_string(),
                nullable: true,
                ordinal: idx,
            })
            .collect();
        let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

        let rows: Vec<Row> = pg_rows
            .iter()
            .map(|pg_row| {
                let values = (0..columns.len())
                    .map(|idx| postgres_to_value(pg_row, idx))
                    .collect();
                Row::new(column_names.clone(), values)
            })
            .collect();

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(row_count = rows.len(), execution_time_ms, "query executed");
        Ok(QueryResult {
            id: uuid::Uuid::new_v4(),
            columns,
            rows,
            affected_rows: 0,
            execution_time_ms,
        })
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(driver) = self.driver.lock().await.take() {
            driver.abort();
        }
        tracing::debug!("PostgreSQL connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
            || self.client.try_lock().is_ok_and(|client| client.is_closed())
    }

    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        Some(Arc::new(PostgresCancelHandle {
            cancel_token: self.cancel_token.clone(),
        }))
    }
}

/// Parameter value already converted to the server-side type
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// Decimal text sent in NUMERIC binary form
    Numeric(String),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    DateTimeUtc(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    DateTime(chrono::NaiveDateTime),
}

fn is_text_type(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN)
}

impl PgValue {
    pub(crate) fn from_value_for_type(value: &Value, target_type: &Type) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::String(v) => Self::coerce_string(v, target_type),
            _ if is_text_type(target_type) => PgValue::String(value.to_string()),

            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int8(v) => Self::coerce_int(i64::from(*v), target_type),
            Value::Int16(v) => Self::coerce_int(i64::from(*v), target_type),
            Value::Int32(v) => Self::coerce_int(i64::from(*v), target_type),
            Value::Int64(v) => Self::coerce_int(*v, target_type),
            Value::Float32(v) => Self::coerce_float(f64::from(*v), target_type),
            Value::Float64(v) => Self::coerce_float(*v, target_type),
            Value::Decimal(v) => Self::coerce_string(v, target_type),
            Value::Json(v) => PgValue::Json(v.clone()),
            _ => Self::from_value(value),
        }
    }

    fn coerce_int(value: i64, target_type: &Type) -> Self {
        match *target_type {
            Type::INT2 => i16::try_from(value).map_or(PgValue::Int64(value), PgValue::Int16),
            Type::INT4 => i32::try_from(value).map_or(PgValue::Int64(value), PgValue::Int32),
            Type::FLOAT4 => PgValue::Float32(value as f32),
            Type::FLOAT8 => PgValue::Float64(value as f64),
            Type::NUMERIC => PgValue::Numeric(value.to_string()),
            Type::BOOL => PgValue::Bool(value != 0),
            _ => PgValue::Int64(value),
        }
    }

    fn coerce_float(value: f64, target_type: &Type) -> Self {
        match *target_type {
            Type::FLOAT4 => PgValue::Float32(value as f32),
            Type::NUMERIC if value.is_finite() => PgValue::Numeric(value.to_string()),
            Type::INT2 | Type::INT4 | Type::INT8 if value.fract() == 0.0 => {
                Self::coerce_int(value as i64, target_type)
            }
            _ => PgValue::Float64(value),
        }
    }

    fn coerce_string(value: &str, target_type: &Type) -> Self {
        let fallback = || PgValue::String(value.to_string());
        let trimmed = value.trim();

        match *target_type {
            Type::INT2 | Type::INT4 | Type::INT8 => trimmed
                .parse::<i64>()
                .map(|v| Self::coerce_int(v, target_type))
                .unwrap_or_else(|_| fallback()),
            Type::FLOAT4 | Type::FLOAT8 => trimmed
                .parse::<f64>()
                .map(|v| Self::coerce_float(v, target_type))
                .unwrap_or_else(|_| fallback()),
            Type::NUMERIC => PgValue::Numeric(trimmed.to_string()),
            Type::BOOL => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "t" | "1" | "yes" | "y" => PgValue::Bool(true),
                "false" | "f" | "0" | "no" | "n" => PgValue::Bool(false),
                _ => fallback(),
            },
            Type::UUID => uuid::Uuid::parse_str(trimmed)
                .map(PgValue::Uuid)
                .unwrap_or_else(|_| fallback()),
            Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(value)
                .map(PgValue::Json)
                .unwrap_or_else(|_| PgValue::Json(serde_json::Value::String(value.to_string()))),
            Type::DATE => chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(PgValue::Date)
                .unwrap_or_else(|_| fallback()),
            Type::TIME => chrono::NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
                .or_else(|_| chrono::NaiveTime::parse_from_str(trimmed, "%H:%M"))
                .map(PgValue::Time)
                .unwrap_or_else(|_| fallback()),
            Type::TIMESTAMP => parse_naive_timestamp(trimmed)
                .map(PgValue::DateTime)
                .unwrap_or_else(fallback),
            Type::TIMESTAMPTZ => chrono::DateTime::parse_from_rfc3339(trimmed)
                .map(|ts| ts.with_timezone(&chrono::Utc))
                .ok()
                .or_else(|| parse_naive_timestamp(trimmed).map(|ts| ts.and_utc()))
                .map(PgValue::DateTimeUtc)
                .unwrap_or_else(fallback),
            _ => fallback(),
        }
    }

    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int8(v) => PgValue::Int16(i16::from(*v)),
            Value::Int16(v) => PgValue::Int16(*v),
            Value::Int32(v) => PgValue::Int32(*v),
            Value::Int64(v) => PgValue::Int64(*v),
            Value::Float32(v) => PgValue::Float32(*v),
            Value::Float64(v) => PgValue::Float64(*v),
            Value::Decimal(v) => PgValue::Numeric(v.clone()),
            Value::String(v) => PgValue::String(v.clone()),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => PgValue::Uuid(*v),
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::DateTimeUtc(v) => PgValue::DateTimeUtc(*v),
            Value::Date(v) => PgValue::Date(*v),
            Value::Time(v) => PgValue::Time(*v),
            Value::DateTime(v) => PgValue::DateTime(*v),
            Value::Array(_) => PgValue::String(value.to_string()),
        }
    }
}

fn parse_naive_timestamp(value: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

impl ToSql for PgValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self {
            PgValue::Null => Ok(IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::Int16(v) => v.to_sql(ty, out),
            PgValue::Int32(v) => v.to_sql(ty, out),
            PgValue::Int64(v) => v.to_sql(ty, out),
            PgValue::Float32(v) => v.to_sql(ty, out),
            PgValue::Float64(v) => v.to_sql(ty, out),
            PgValue::Numeric(v) => {
                encode_numeric(v, out)?;
                Ok(IsNull::No)
            }
            PgValue::String(v) => v.to_sql(ty, out),
            PgValue::Bytes(v) => v.to_sql(ty, out),
            PgValue::Uuid(v) => v.to_sql(ty, out),
            PgValue::Json(v) => v.to_sql(ty, out),
            PgValue::DateTimeUtc(v) => v.to_sql(ty, out),
            PgValue::Date(v) => v.to_sql(ty, out),
            PgValue::Time(v) => v.to_sql(ty, out),
            PgValue::DateTime(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;

/// Write decimal text in the NUMERIC wire format: base-10000 digit groups
/// with a group weight, a sign word and the display scale
pub(crate) fn encode_numeric(text: &str, out: &mut BytesMut) -> std::result::Result<(), BoxError> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("nan") {
        out.put_i16(0);
        out.put_i16(0);
        out.put_u16(NUMERIC_NAN);
        out.put_i16(0);
        return Ok(());
    }

    let (negative, unsigned) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if integer.len() + fraction.len() == 0 || !all_digits(integer) || !all_digits(fraction) {
        return Err(format!("invalid numeric value: {:?}", text).into());
    }

    let integer = integer.trim_start_matches('0');
    let dscale = i16::try_from(fraction.len()).map_err(|_| "numeric scale out of range")?;

    let int_pad = (4 - integer.len() % 4) % 4;
    let frac_pad = (4 - fraction.len() % 4) % 4;
    let padded = format!(
        "{}{}{}{}",
        "0".repeat(int_pad),
        integer,
        fraction,
        "0".repeat(frac_pad)
    );
    let mut groups: Vec<u16> = padded
        .as_bytes()
        .chunks(4)
        .map(|chunk| chunk.iter().fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0')))
        .collect();

    let integer_groups = (integer.len() + int_pad) / 4;
    let mut weight = i16::try_from(integer_groups).map_err(|_| "numeric weight out of range")? - 1;

    let leading = groups.iter().take_while(|g| **g == 0).count();
    groups.drain(..leading);
    weight -= i16::try_from(leading).map_err(|_| "numeric weight out of range")?;
    while groups.last() == Some(&0) {
        groups.pop();
    }

    let (weight, sign) = if groups.is_empty() {
        (0, 0)
    } else {
        (weight, if negative { NUMERIC_NEG } else { 0 })
    };

    out.put_i16(i16::try_from(groups.len()).map_err(|_| "numeric too long")?);
    out.put_i16(weight);
    out.put_u16(sign);
    out.put_i16(dscale);
    for group in groups {
        out.put_u16(group);
    }
    Ok(())
}

/// NUMERIC decoded to its exact decimal text
#[derive(Debug)]
pub(crate) struct PgNumericString(pub(crate) String);

/// Any value whose wire form is its UTF-8 text (enums, citext, xml)
#[derive(Debug)]
struct PgFallbackString(String);

impl PgNumericString {
    pub(crate) fn parse(raw: &[u8]) -> std::result::Result<String, BoxError> {
        if raw.len() < 8 {
            return Err("invalid NUMERIC payload: too short".into());
        }

        let ndigits = i16::from_be_bytes([raw[0], raw[1]]).max(0) as usize;
        let weight = i16::from_be_bytes([raw[2], raw[3]]);
        let sign = u16::from_be_bytes([raw[4], raw[5]]);
        let dscale = i16::from_be_bytes([raw[6], raw[7]]).max(0) as usize;

        if raw.len() < 8 + ndigits * 2 {
            return Err("invalid NUMERIC payload: truncated digits".into());
        }
        if sign == NUMERIC_NAN {
            return Ok("NaN".to_string());
        }

        let mut digits = Vec::with_capacity(ndigits);
        for index in 0..ndigits {
            let offset = 8 + index * 2;
            let group = u16::from_be_bytes([raw[offset], raw[offset + 1]]);
            if group > 9999 {
                return Err("invalid NUMERIC payload: group out of range".into());
            }
            digits.push(group);
        }
        let mut integer_text = String::new();
        if weight < 0 {
            integer_text.push('0');
        } else {
            for group_index in 0..=(weight as usize) {
                let group = digits.get(group_index).copied().unwrap_or(0);
                if group_index == 0 {
                    integer_text.push_str(&group.to_string());
                } else {
                    integer_text.push_str(&format!("{group:04}"));
                }
            }
        }

        let mut fraction_text = String::new();
        if dscale > 0 {
            // Groups between the decimal point and the first stored fraction group
            if weight < -1 {
                fraction_text.push_str(&"0000".repeat((-weight - 1) as usize));
            }
            let start = if weight >= 0 { weight as usize + 1 } else { 0 };
            for group in digits.iter().skip(start) {
                fraction_text.push_str(&format!("{group:04}"));
            }
            if fraction_text.len() < dscale {
                fraction_text.push_str(&"0".repeat(dscale - fraction_text.len()));
            } else {
                fraction_text.truncate(dscale);
            }
        }

        let mut output = String::new();
        if sign == NUMERIC_NEG {
            output.push('-');
        }
        output.push_str(&integer_text);
        if !fraction_text.is_empty() {
            output.push('.');
            output.push_str(&fraction_text);
        }
        Ok(output)
    }
}

impl<'a> FromSql<'a> for PgNumericString {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(Self::parse(raw)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

impl<'a> FromSql<'a> for PgFallbackString {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(String::from_utf8(raw.to_vec())?))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a PgRow, idx: usize) -> Option<T> {
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}

fn array<'a, T: FromSql<'a>>(row: &'a PgRow, idx: usize, wrap: fn(T) -> Value) -> Value {
    get::<Vec<T>>(row, idx)
        .map(|items| Value::Array(items.into_iter().map(wrap).collect()))
        .unwrap_or(Value::Null)
}

/// Convert PostgreSQL row value to our Value type
pub(crate) fn postgres_to_value(row: &PgRow, idx: usize) -> Value {
    let type_name = row.columns()[idx].type_().name();

    let value = match type_name {
        "bool" => get(row, idx).map(Value::Bool),
        "int2" => get(row, idx).map(Value::Int16),
        "int4" => get(row, idx).map(Value::Int32),
        "int8" => get(row, idx).map(Value::Int64),
        "oid" => get::<u32>(row, idx).map(|v| Value::Int64(i64::from(v))),
        "float4" => get(row, idx).map(Value::Float32),
        "float8" => get(row, idx).map(Value::Float64),
        "numeric" => get::<PgNumericString>(row, idx).map(|v| Value::Decimal(v.0)),
        "char" => get::<i8>(row, idx).map(|v| Value::String(char::from(v as u8).to_string())),
        "text" | "varchar" | "bpchar" | "name" => get(row, idx).map(Value::String),
        "bytea" => get(row, idx).map(Value::Bytes),
        "uuid" => get(row, idx).map(Value::Uuid),
        "json" | "jsonb" => get(row, idx).map(Value::Json),
        "date" => get(row, idx).map(Value::Date),
        "time" => get(row, idx).map(Value::Time),
        "timestamp" => get(row, idx).map(Value::DateTime),
        "timestamptz" => get(row, idx).map(Value::DateTimeUtc),
        // Array type names carry a leading underscore
        "_text" | "_varchar" | "_bpchar" | "_name" => Some(array(row, idx, Value::String)),
        "_int2" => Some(array(row, idx, Value::Int16)),
        "_int4" => Some(array(row, idx, Value::Int32)),
        "_int8" => Some(array(row, idx, Value::Int64)),
        "_float8" => Some(array(row, idx, Value::Float64)),
        "_bool" => Some(array(row, idx, Value::Bool)),
        "_uuid" => Some(array(row, idx, Value::Uuid)),
        _ => get::<PgFallbackString>(row, idx).map(|v| Value::String(v.0)),
    };

    value.unwrap_or(Value::Null)
}
