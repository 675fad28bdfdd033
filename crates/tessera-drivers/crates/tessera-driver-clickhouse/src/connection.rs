//! ClickHouse connection over the HTTP interface

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use tessera_core::{
    CanonicalType, ColumnMeta, Connection, DaoError, DatabaseType, QueryResult, Result, Row,
    StatementResult, Value, normalize_type,
};

/// First line column names, second line types, then one JSON array per row
const RESULT_FORMAT: &str = "JSONCompactEachRowWithNamesAndTypes";

/// `TIMEOUT_EXCEEDED`: `max_execution_time` ran out
const TIMEOUT_EXCEEDED: &str = "Code: 159";
/// `QUERY_WAS_CANCELLED`
const QUERY_WAS_CANCELLED: &str = "Code: 394";

/// ClickHouse connection wrapper.
///
/// HTTP is stateless, so the client is shared freely between concurrent
/// requests; statements arrive with their values already inlined and the
/// `params` slices are always empty.
pub struct ClickHouseConnection {
    client: clickhouse::Client,
    closed: AtomicBool,
}

impl ClickHouseConnection {
    /// Wrap a configured client after one verifying round trip
    pub async fn connect(client: clickhouse::Client) -> Result<Self> {
        let ping: std::result::Result<u8, clickhouse::error::Error> =
            client.query("SELECT 1").fetch_one().await;
        ping.map_err(|e| DaoError::Connection(format!("Failed to connect to ClickHouse: {}", e)))?;

        tracing::debug!("ClickHouse connection established");
        Ok(Self {
            client,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DaoError::Connection("ClickHouse connection is closed".into()));
        }
        Ok(())
    }

    fn ensure_inlined(params: &[Value]) -> Result<()> {
        if params.is_empty() {
            Ok(())
        } else {
            Err(DaoError::NotSupported(
                "ClickHouse statements take inlined literals, not bound parameters".into(),
            ))
        }
    }
}

/// `?` is the client's bind marker; `??` is a literal question mark
pub(crate) fn escape_bind_markers(sql: &str) -> String {
    sql.replace('?', "??")
}

/// Classify the server's error text by its exception code
pub(crate) fn server_error(context: &str, message: &str) -> DaoError {
    if message.contains(TIMEOUT_EXCEEDED) {
        DaoError::Timeout(message.to_string())
    } else if message.contains(QUERY_WAS_CANCELLED) {
        DaoError::Cancelled
    } else {
        DaoError::Query(format!("{}: {}", context, message))
    }
}

fn query_error(context: &str, error: clickhouse::error::Error) -> DaoError {
    use clickhouse::error::Error;
    match &error {
        Error::Network(_) => DaoError::Connection(format!("{}: {}", context, error)),
        Error::TimedOut => DaoError::Timeout(format!("{}: {}", context, error)),
        Error::BadResponse(message) => server_error(context, message),
        _ => DaoError::Query(format!("{}: {}", context, error)),
    }
}

#[async_trait]
impl Connection for ClickHouseConnection {
    fn driver_name(&self) -> &str {
        "clickhouse"
    }

    /// Mutations report no row counts over HTTP; `affected_rows` is always 0
    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.ensure_not_closed()?;
        Self::ensure_inlined(params)?;
        let start = Instant::now();

        self.client
            .query(&escape_bind_markers(sql))
            .execute()
            .await
            .map_err(|e| query_error("Failed to execute statement", e))?;

        tracing::debug!(duration_ms = start.elapsed().as_millis() as u64, "execute completed");
        Ok(StatementResult::default())
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.ensure_not_closed()?;
        Self::ensure_inlined(params)?;
        let start = Instant::now();

        let mut cursor = self
            .client
            .query(&escape_bind_markers(sql))
            .fetch_bytes(RESULT_FORMAT)
            .map_err(|e| query_error("Failed to execute query", e))?;

        let mut body = Vec::new();
        while let Some(chunk) = cursor
            .next()
            .await
            .map_err(|e| query_error("Failed to read query result", e))?
        {
            body.extend_from_slice(&chunk);
        }

        let body = String::from_utf8(body)
            .map_err(|e| DaoError::Driver(format!("ClickHouse result is not UTF-8: {}", e)))?;
        let (columns, rows) = parse_compact_rows(&body)?;

        let execution_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(row_count = rows.len(), duration_ms = execution_time_ms, "query completed");
        Ok(QueryResult {
            id: uuid::Uuid::new_v4(),
            columns,
            rows,
            affected_rows: 0,
            execution_time_ms,
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("ClickHouse connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn parse_line(line: &str) -> Result<Vec<serde_json::Value>> {
    Ok(serde_json::from_str(line)?)
}

fn header(line: Option<&str>) -> Result<Vec<String>> {
    let Some(line) = line else {
        return Ok(Vec::new());
    };
    Ok(parse_line(line)?
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}

/// Parse a `JSONCompactEachRowWithNamesAndTypes` body
pub(crate) fn parse_compact_rows(body: &str) -> Result<(Vec<ColumnMeta>, Vec<Row>)> {
    let mut lines = body.lines().filter(|line| !line.trim().is_empty());
    let names = header(lines.next())?;
    let types = header(lines.next())?;

    let columns: Vec<ColumnMeta> = names
        .iter()
        .enumerate()
        .map(|(ordinal, name)| {
            let native = types.get(ordinal).cloned().unwrap_or_default();
            ColumnMeta {
                name: name.clone(),
                nullable: native.starts_with("Nullable("),
                data_type: native,
                ordinal,
            }
        })
        .collect();
    let canonical: Vec<CanonicalType> = columns
        .iter()
        .map(|c| normalize_type(DatabaseType::Clickhouse, &c.data_type))
        .collect();

    let rows = lines
        .map(|line| {
            let cells = parse_line(line)?;
            let values = cells
                .iter()
                .zip(canonical.iter())
                .map(|(cell, ty)| json_cell_to_value(cell, *ty))
                .collect();
            Ok(Row::new(names.clone(), values))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((columns, rows))
}

/// Interpret one JSON cell by its column type. 64-bit and wider integers
/// arrive quoted; temporals arrive as `YYYY-MM-DD[ hh:mm:ss[.fff]]` text.
pub(crate) fn json_cell_to_value(cell: &serde_json::Value, ty: CanonicalType) -> Value {
    use serde_json::Value as Json;

    let fallback = || Value::from_json(cell);
    match (ty, cell) {
        (_, Json::Null) => Value::Null,
        (CanonicalType::Integer, Json::Number(n)) => n
            .as_i64()
            .map(Value::Int64)
            .unwrap_or_else(|| Value::Decimal(n.to_string())),
        (CanonicalType::Integer, Json::String(s)) => s
            .parse::<i64>()
            .map(Value::Int64)
            .unwrap_or_else(|_| Value::Decimal(s.clone())),
        (CanonicalType::Float, Json::Number(n)) => n.as_f64().map_or_else(fallback, Value::Float64),
        (CanonicalType::Decimal, Json::Number(n)) => Value::Decimal(n.to_string()),
        (CanonicalType::Decimal, Json::String(s)) => Value::Decimal(s.clone()),
        (CanonicalType::Boolean, Json::Number(n)) => Value::Bool(n.as_i64().is_some_and(|i| i != 0)),
        (CanonicalType::Date, Json::String(s)) => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_or_else(|_| fallback(), Value::Date),
        (CanonicalType::Timestamp, Json::String(s)) => {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .map_or_else(|_| fallback(), Value::DateTime)
        }
        (CanonicalType::Uuid, Json::String(s)) => {
            uuid::Uuid::parse_str(s).map_or_else(|_| fallback(), Value::Uuid)
        }
        (CanonicalType::Json | CanonicalType::Array, Json::Array(_) | Json::Object(_)) => {
            Value::Json(cell.clone())
        }
        _ => fallback(),
    }
}
