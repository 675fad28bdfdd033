//! MS SQL Server connection implementation using tiberius

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tessera_core::{ColumnMeta, Connection, DaoError, QueryResult, Result, Row, StatementResult, Value};
use tiberius::{Client, ColumnData, Config, Row as TiberiusRow, ToSql};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

/// Lock request time out period exceeded
const LOCK_TIMEOUT: u32 = 1222;

type TdsClient = Client<Compat<TcpStream>>;

/// MS SQL Server connection using tiberius.
///
/// TDS has one request in flight per session, so requests are serialized
/// on the client. A request whose future is dropped before the response is
/// read leaves unread tokens on the wire; the session is then reported
/// closed and the client cache replaces it.
pub struct MssqlConnection {
    client: Mutex<TdsClient>,
    closed: AtomicBool,
    desynced: AtomicBool,
}

/// Flags the session as desynchronized unless the request completes
struct Inflight<'a> {
    desynced: &'a AtomicBool,
    completed: bool,
}

impl<'a> Inflight<'a> {
    fn start(desynced: &'a AtomicBool) -> Self {
        Self {
            desynced,
            completed: false,
        }
    }

    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for Inflight<'_> {
    fn drop(&mut self) {
        if !self.completed {
            tracing::warn!("MS SQL Server request abandoned mid-response; session retired");
            self.desynced.store(true, Ordering::SeqCst);
        }
    }
}

async fn open(config: Config) -> tiberius::Result<TdsClient> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;
    Client::connect(config, tcp.compat_write()).await
}

impl MssqlConnection {
    /// Connect, following one server redirect (Azure gateways answer the
    /// login with the address of the actual node)
    #[tracing::instrument(skip(config), fields(addr = %config.get_addr()))]
    pub async fn connect(config: Config) -> Result<Self> {
        tracing::debug!("connecting to MS SQL Server");

        let client = match open(config.clone()).await {
            Err(tiberius::error::Error::Routing { host, port }) => {
                tracing::info!(%host, port, "following MS SQL Server redirect");
                let mut redirected = config;
                redirected.host(&host);
                redirected.port(port);
                open(redirected).await
            }
            other => other,
        }
        .map_err(|e| DaoError::Connection(format!("Failed to connect to MS SQL Server: {}", e)))?;

        tracing::debug!("successfully connected to MS SQL Server");
        Ok(Self {
            client: Mutex::new(client),
            closed: AtomicBool::new(false),
            desynced: AtomicBool::new(false),
        })
    }

    async fn lock_client(&self) -> Result<MutexGuard<'_, TdsClient>> {
        if self.is_closed() {
            return Err(DaoError::Connection("MS SQL Server connection is closed".into()));
        }
        Ok(self.client.lock().await)
    }
}

/// Map a server error number to the DAO error it stands for
pub(crate) fn server_error(context: &str, code: u32, message: &str) -> DaoError {
    match code {
        LOCK_TIMEOUT => DaoError::Timeout(message.to_string()),
        _ => DaoError::Query(format!("{}: {} (code: {})", context, message, code)),
    }
}

fn query_error(context: &str, error: tiberius::error::Error) -> DaoError {
    use tiberius::error::Error;
    match &error {
        Error::Server(token) => server_error(context, token.code(), token.message()),
        Error::Io { .. } | Error::Tls(_) | Error::Routing { .. } => {
            DaoError::Connection(format!("{}: {}", context, error))
        }
        _ => DaoError::Query(format!("{}: {}", context, error)),
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    fn driver_name(&self) -> &str {
        "mssql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let start = Instant::now();
        let mut client = self.lock_client().await?;
        let bound = bind_params(params);
        let refs: Vec<&dyn ToSql> = bound.iter().map(|p| p as &dyn ToSql).collect();

        let inflight = Inflight::start(&self.desynced);
        let outcome = client.execute(sql, &refs[..]).await;
        inflight.complete();

        let result = outcome.map_err(|e| query_error("Failed to execute statement", e))?;
        let affected_rows = result.rows_affected().iter().sum::<u64>();
        tracing::debug!(
            affected_rows,
            duration_ms = start.elapsed().as_millis() as u64,
            "execute completed"
        );
        Ok(StatementResult {
            affected_rows,
            last_insert_id: None,
        })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start = Instant::now();
        let mut client = self.lock_client().await?;
        let bound = bind_params(params);
        let refs: Vec<&dyn ToSql> = bound.iter().map(|p| p as &dyn ToSql).collect();

        let inflight = Inflight::start(&self.desynced);
        let outcome = async {
            let mut stream = client.query(sql, &refs[..]).await?;
            // Read ahead of the rows so an empty result still has columns
            let columns: Vec<ColumnMeta> = stream
                .columns()
                .await?
                .map(|columns| {
                    columns
                        .iter()
                        .enumerate()
                        .map(|(ordinal, column)| column_meta(column, ordinal))
                        .collect()
                })
                .unwrap_or_default();
            let rows = stream.into_first_result().await?;
            Ok::<_, tiberius::error::Error>((columns, rows))
        }
        .await;
        inflight.complete();

        let (columns, tds_rows) = outcome.map_err(|e| query_error("Failed to execute query", e))?;
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let rows: Vec<Row> = tds_rows
            .into_iter()
            .map(|row| Row::new(names.clone(), row_values(row)))
            .collect();

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
        tracing::debug!("MS SQL Server connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.desynced.load(Ordering::SeqCst)
    }
}

fn column_meta(column: &tiberius::Column, ordinal: usize) -> ColumnMeta {
    ColumnMeta {
        name: column.name().to_string(),
        data_type: format!("{:?}", column.column_type()),
        nullable: true,
        ordinal,
    }
}

fn row_values(row: TiberiusRow) -> Vec<Value> {
    row.into_iter().map(column_data_to_value).collect()
}

fn day_offset(year: i32, days: i64) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)?.checked_add_signed(chrono::Duration::days(days))
}

/// `increments` are units of 10^-scale seconds since midnight
pub(crate) fn time_of_day(increments: u64, scale: u8) -> Option<NaiveTime> {
    let nanos = increments.checked_mul(10u64.pow(9u32.saturating_sub(u32::from(scale))))?;
    NaiveTime::from_num_seconds_from_midnight_opt(
        (nanos / 1_000_000_000) as u32,
        (nanos % 1_000_000_000) as u32,
    )
}

fn datetime2(value: &tiberius::time::DateTime2) -> Option<NaiveDateTime> {
    let date = day_offset(1, i64::from(value.date().days()))?;
    let time = time_of_day(value.time().increments(), value.time().scale())?;
    Some(date.and_time(time))
}

/// Convert tiberius ColumnData to a Value; out-of-range temporals become NULL
pub(crate) fn column_data_to_value(data: ColumnData<'static>) -> Value {
    match data {
        ColumnData::Bit(v) => v.map_or(Value::Null, Value::Bool),
        ColumnData::U8(v) => v.map_or(Value::Null, |v| Value::Int16(i16::from(v))),
        ColumnData::I16(v) => v.map_or(Value::Null, Value::Int16),
        ColumnData::I32(v) => v.map_or(Value::Null, Value::Int32),
        ColumnData::I64(v) => v.map_or(Value::Null, Value::Int64),
        ColumnData::F32(v) => v.map_or(Value::Null, Value::Float32),
        ColumnData::F64(v) => v.map_or(Value::Null, Value::Float64),
        ColumnData::String(v) => v.map_or(Value::Null, |s| Value::String(s.into_owned())),
        ColumnData::Guid(v) => v.map_or(Value::Null, Value::Uuid),
        ColumnData::Binary(v) => v.map_or(Value::Null, |b| Value::Bytes(b.into_owned())),
        ColumnData::Numeric(v) => v.map_or(Value::Null, |n| Value::Decimal(n.to_string())),
        ColumnData::Xml(v) => v.map_or(Value::Null, |x| Value::String(x.into_owned().into_string())),
        // datetime counts 1/300 second ticks
        ColumnData::DateTime(Some(v)) => {
            let ticks = u64::from(v.seconds_fragments());
            day_offset(1900, i64::from(v.days()))
                .zip(NaiveTime::from_num_seconds_from_midnight_opt(
                    (ticks / 300) as u32,
                    ((ticks % 300) * 10_000_000 / 3) as u32,
                ))
                .map_or(Value::Null, |(date, time)| Value::DateTime(date.and_time(time)))
        }
        // smalldatetime counts minutes
        ColumnData::SmallDateTime(Some(v)) => day_offset(1900, i64::from(v.days()))
            .zip(NaiveTime::from_num_seconds_from_midnight_opt(
                u32::from(v.seconds_fragments()) * 60,
                0,
            ))
            .map_or(Value::Null, |(date, time)| Value::DateTime(date.and_time(time))),
        ColumnData::DateTime2(Some(v)) => datetime2(&v).map_or(Value::Null, Value::DateTime),
        // The wire value is UTC; the offset only records the original zone
        ColumnData::DateTimeOffset(Some(v)) => datetime2(&v.datetime2())
            .map_or(Value::Null, |naive| Value::DateTimeUtc(naive.and_utc())),
        ColumnData::Date(Some(v)) => day_offset(1, i64::from(v.days())).map_or(Value::Null, Value::Date),
        ColumnData::Time(Some(v)) => time_of_day(v.increments(), v.scale()).map_or(Value::Null, Value::Time),
        ColumnData::DateTime(None)
        | ColumnData::SmallDateTime(None)
        | ColumnData::DateTime2(None)
        | ColumnData::DateTimeOffset(None)
        | ColumnData::Date(None)
        | ColumnData::Time(None) => Value::Null,
    }
}

/// Owned bind value
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MssqlParam {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(chrono::DateTime<chrono::Utc>),
}

impl ToSql for MssqlParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            // Untyped NULL converts implicitly to every column type as nvarchar
            MssqlParam::Null => ColumnData::String(None),
            MssqlParam::Bool(v) => ColumnData::Bit(Some(*v)),
            MssqlParam::I16(v) => ColumnData::I16(Some(*v)),
            MssqlParam::I32(v) => ColumnData::I32(Some(*v)),
            MssqlParam::I64(v) => ColumnData::I64(Some(*v)),
            MssqlParam::F32(v) => ColumnData::F32(Some(*v)),
            MssqlParam::F64(v) => ColumnData::F64(Some(*v)),
            MssqlParam::String(v) => ColumnData::String(Some(std::borrow::Cow::Borrowed(v.as_str()))),
            MssqlParam::Bytes(v) => ColumnData::Binary(Some(std::borrow::Cow::Borrowed(v.as_slice()))),
            MssqlParam::Uuid(v) => ColumnData::Guid(Some(*v)),
            MssqlParam::Date(v) => v.to_sql(),
            MssqlParam::Time(v) => v.to_sql(),
            MssqlParam::DateTime(v) => v.to_sql(),
            MssqlParam::DateTimeUtc(v) => v.to_sql(),
        }
    }
}

/// Convert Values to tiberius parameters. Decimals travel as text, which
/// the server converts exactly into the target `decimal` column.
pub(crate) fn bind_params(values: &[Value]) -> Vec<MssqlParam> {
    values
        .iter()
        .map(|value| match value {
            Value::Null => MssqlParam::Null,
            Value::Bool(b) => MssqlParam::Bool(*b),
            Value::Int8(i) => MssqlParam::I16(i16::from(*i)),
            Value::Int16(i) => MssqlParam::I16(*i),
            Value::Int32(i) => MssqlParam::I32(*i),
            Value::Int64(i) => MssqlParam::I64(*i),
            Value::Float32(f) => MssqlParam::F32(*f),
            Value::Float64(f) => MssqlParam::F64(*f),
            Value::Decimal(s) | Value::String(s) => MssqlParam::String(s.clone()),
            Value::Bytes(b) => MssqlParam::Bytes(b.clone()),
            Value::Uuid(u) => MssqlParam::Uuid(*u),
            Value::Date(d) => MssqlParam::Date(*d),
            Value::Time(t) => MssqlParam::Time(*t),
            Value::DateTime(dt) => MssqlParam::DateTime(*dt),
            Value::DateTimeUtc(dt) => MssqlParam::DateTimeUtc(*dt),
            Value::Json(j) => MssqlParam::String(j.to_string()),
            Value::Array(_) => MssqlParam::String(value.to_string()),
        })
        .collect()
}
