//! MySQL connection implementation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use mysql_async::consts::ColumnType;
use mysql_async::prelude::*;
use mysql_async::{
    Conn, Opts, Params, Pool, PoolConstraints, PoolOpts, Row as MySqlRow,
    Value as MySqlValue,
};
use tessera_core::{
    ColumnMeta, Connection, DaoError, QueryCancelHandle, QueryResult, Result, Row,
    StatementResult, Value,
};

/// `ER_QUERY_TIMEOUT`: the `MAX_EXECUTION_TIME` budget ran out
const ER_QUERY_TIMEOUT: u16 = 3024;
/// `ER_QUERY_INTERRUPTED`: stopped by `KILL QUERY`
const ER_QUERY_INTERRUPTED: u16 = 1317;

/// Cancel handle for MySQL queries.
///
/// MySQL cancels through a second session issuing `KILL QUERY <id>` against
/// the session that runs the statement.
pub struct MySqlCancelHandle {
    opts: Opts,
    running: Arc<AtomicU32>,
}

impl QueryCancelHandle for MySqlCancelHandle {
    fn cancel(&self) {
        let connection_id = self.running.load(Ordering::SeqCst);
        if connection_id == 0 {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no runtime available to send KILL QUERY");
            return;
        };
        tracing::debug!(connection_id, "killing MySQL query");
        let opts = self.opts.clone();
        runtime.spawn(async move {
            let outcome = async {
                let mut conn = Conn::new(opts).await?;
                conn.query_drop(format!("KILL QUERY {}", connection_id)).await?;
                conn.disconnect().await
            };
            if let Err(e) = outcome.await {
                tracing::warn!(error = %e, "failed to cancel MySQL query");
            }
        });
    }
}

/// Clears the running session id when the statement finishes or is dropped
struct RunningGuard<'a>(&'a AtomicU32);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

/// MySQL connection wrapper.
///
/// The pool holds exactly one session so `LAST_INSERT_ID()` and session
/// state belong to the statement that produced them; concurrent callers
/// queue on `get_conn`.
pub struct MySqlConnection {
    pool: Pool,
    opts: Opts,
    running: Arc<AtomicU32>,
    closed: AtomicBool,
}

impl MySqlConnection {
    /// Connect and verify the session with one round trip
    pub async fn connect(opts: Opts) -> Result<Self> {
        tracing::info!(
            host = %opts.ip_or_hostname(),
            port = opts.tcp_port(),
            database = ?opts.db_name(),
            "connecting to MySQL database"
        );

        let constraints = PoolConstraints::new(1, 1).ok_or_else(|| {
            DaoError::Connection("Failed to configure MySQL pool constraints (min=1, max=1)".into())
        })?;
        let pool_opts = PoolOpts::default()
            .with_constraints(constraints)
            .with_reset_connection(false);
        let opts: Opts = mysql_async::OptsBuilder::from_opts(opts).pool_opts(pool_opts).into();

        let pool = Pool::new(opts.clone());
        let conn = pool
            .get_conn()
            .await
            .map_err(|e| DaoError::Connection(format!("Failed to connect to MySQL: {}", e)))?;
        drop(conn);

        tracing::info!("MySQL connection established");
        Ok(Self {
            pool,
            opts,
            running: Arc::new(AtomicU32::new(0)),
            closed: AtomicBool::new(false),
        })
    }

    async fn get_conn(&self) -> Result<Conn> {
        if self.is_closed() {
            return Err(DaoError::Connection("MySQL connection is closed".into()));
        }
        self.pool
            .get_conn()
            .await
            .map_err(|e| DaoError::Connection(format!("Failed to get MySQL connection: {}", e)))
    }

    fn track<'a>(&'a self, conn: &Conn) -> RunningGuard<'a> {
        self.running.store(conn.id(), Ordering::SeqCst);
        RunningGuard(&self.running)
    }
}

/// Map a server error code to the DAO error it stands for
pub(crate) fn server_error(context: &str, code: u16, message: &str) -> DaoError {
    match code {
        ER_QUERY_TIMEOUT => DaoError::Timeout(message.to_string()),
        ER_QUERY_INTERRUPTED => DaoError::Cancelled,
        _ => DaoError::Query(format!("{}: {} (code: {})", context, message, code)),
    }
}

fn query_error(context: &str, error: mysql_async::Error) -> DaoError {
    match error {
        mysql_async::Error::Server(server) => server_error(context, server.code, &server.message),
        mysql_async::Error::Io(e) => DaoError::Connection(format!("{}: {}", context, e)),
        mysql_async::Error::Driver(
            e @ (mysql_async::DriverError::ConnectionClosed
            | mysql_async::DriverError::PoolDisconnected),
        ) => DaoError::Connection(format!("{}: {}", context, e)),
        other => DaoError::Query(format!("{}: {}", context, other)),
    }
}

fn params_of(params: &[Value]) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.iter().map(value_to_mysql).collect())
    }
}

/// Bind value for the binary protocol
pub(crate) fn value_to_mysql(value: &Value) -> MySqlValue {
    let datetime = |dt: &chrono::NaiveDateTime| {
        MySqlValue::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            dt.nanosecond() / 1_000,
        )
    };
    match value {
        Value::Null => MySqlValue::NULL,
        Value::Bool(v) => MySqlValue::Int(i64::from(*v)),
        Value::Int8(v) => MySqlValue::Int(i64::from(*v)),
        Value::Int16(v) => MySqlValue::Int(i64::from(*v)),
        Value::Int32(v) => MySqlValue::Int(i64::from(*v)),
        Value::Int64(v) => MySqlValue::Int(*v),
        Value::Float32(v) => MySqlValue::Float(*v),
        Value::Float64(v) => MySqlValue::Double(*v),
        Value::Decimal(v) | Value::String(v) => MySqlValue::Bytes(v.as_bytes().to_vec()),
        Value::Bytes(v) => MySqlValue::Bytes(v.clone()),
        Value::Uuid(v) => MySqlValue::Bytes(v.to_string().into_bytes()),
        Value::Json(v) => MySqlValue::Bytes(v.to_string().into_bytes()),
        Value::Date(d) => MySqlValue::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        Value::Time(t) => MySqlValue::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1_000,
        ),
        Value::DateTime(dt) => datetime(dt),
        Value::DateTimeUtc(dt) => datetime(&dt.naive_utc()),
        Value::Array(_) => MySqlValue::Bytes(value.to_string().into_bytes()),
    }
}

/// Convert mysql_async Value to our Value type, using column type metadata
/// to interpret byte strings from the text protocol.
pub(crate) fn mysql_value_to_value(val: MySqlValue, col_type: ColumnType) -> Value {
    match val {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => match col_type {
                ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_LONGLONG
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_YEAR => {
                    s.parse::<i64>().map(Value::Int64).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_FLOAT => {
                    s.parse::<f32>().map(Value::Float32).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_DOUBLE => {
                    s.parse::<f64>().map(Value::Float64).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => Value::Decimal(s),
                ColumnType::MYSQL_TYPE_JSON => {
                    serde_json::from_str(&s).map(Value::Json).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_DATE => chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                    .map(Value::Date)
                    .unwrap_or(Value::String(s)),
                ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_TIMESTAMP => {
                    chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                        .map(Value::DateTime)
                        .unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_TIME => chrono::NaiveTime::parse_from_str(&s, "%H:%M:%S%.f")
                    .map(Value::Time)
                    .unwrap_or(Value::String(s)),
                _ => Value::String(s),
            },
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        MySqlValue::Int(i) => Value::Int64(i),
        MySqlValue::UInt(u) => i64::try_from(u)
            .map(Value::Int64)
            .unwrap_or_else(|_| Value::Decimal(u.to_string())),
        MySqlValue::Float(f) => Value::Float32(f),
        MySqlValue::Double(d) => Value::Float64(d),
        MySqlValue::Date(year, month, day, hour, min, sec, micro) => {
            let date = chrono::NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day));
            let is_date_column = col_type == ColumnType::MYSQL_TYPE_DATE;
            match date {
                Some(date) if is_date_column => Value::Date(date),
                Some(date) => date
                    .and_hms_micro_opt(u32::from(hour), u32::from(min), u32::from(sec), micro)
                    .map(Value::DateTime)
                    .unwrap_or(Value::Null),
                // Zero dates ('0000-00-00') have no calendar value
                None => Value::String(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, min, sec
                )),
            }
        }
        MySqlValue::Time(negative, days, hours, mins, secs, micros) => {
            let total_hours = days * 24 + u32::from(hours);
            match (negative, total_hours) {
                (false, 0..=23) => chrono::NaiveTime::from_hms_micro_opt(
                    total_hours,
                    u32::from(mins),
                    u32::from(secs),
                    micros,
                )
                .map(Value::Time)
                .unwrap_or(Value::Null),
                // TIME spans -838:59:59..838:59:59, beyond a time of day
                _ => Value::String(format!(
                    "{}{:02}:{:02}:{:02}.{:06}",
                    if negative { "-" } else { "" },
                    total_hours,
                    mins,
                    secs,
                    micros
                )),
            }
        }
    }
}

fn convert_rows(columns: &[mysql_async::Column], mysql_rows: Vec<MySqlRow>) -> (Vec<ColumnMeta>, Vec<Row>) {
    let column_meta: Vec<ColumnMeta> = columns
        .iter()
        .enumerate()
        .map(|(idx, col)| ColumnMeta {
            name: col.name_str().to_string(),
            data_type: format!("{:?}", col.column_type()),
            nullable: true,
            ordinal: idx,
        })
        .collect();
    let column_names: Vec<String> = column_meta.iter().map(|c| c.name.clone()).collect();
    let column_types: Vec<ColumnType> = columns.iter().map(|c| c.column_type()).collect();

    let rows = mysql_rows
        .into_iter()
        .map(|mysql_row| {
            let values = mysql_row
                .unwrap()
                .into_iter()
                .zip(column_types.iter())
                .map(|(val, col_type)| mysql_value_to_value(val, *col_type))
                .collect();
            Row::new(column_names.clone(), values)
        })
        .collect();
    (column_meta, rows)
}

#[async_trait]
impl Connection for MySqlConnection {
    fn driver_name(&self) -> &str {
        "mysql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let mut conn = self.get_conn().await?;
        let _running = self.track(&conn);

        conn.exec_drop(sql, params_of(params))
            .await
            .map_err(|e| query_error("Failed to execute statement", e))?;

        let affected_rows = conn.affected_rows();
        // LAST_INSERT_ID is 0 when the statement generated no key
        let last_insert_id = conn
            .last_insert_id()
            .filter(|id| *id > 0)
            .and_then(|id| i64::try_from(id).ok());

        tracing::debug!(affected_rows, ?last_insert_id, "statement executed");
        Ok(StatementResult {
            affected_rows,
            last_insert_id,
        })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let mut conn = self.get_conn().await?;
        let _running = self.track(&conn);

        // Statements without parameters go through the text protocol so
        // SHOW, EXPLAIN and friends work without a prepare step
        let (columns, rows) = if params.is_empty() {
            let mut result = conn
                .query_iter(sql)
                .await
                .map_err(|e| query_error("Failed to execute query", e))?;
            let columns = result.columns_ref().to_vec();
            let rows: Vec<MySqlRow> = result
                .collect()
                .await
                .map_err(|e| query_error("Failed to fetch rows", e))?;
            convert_rows(&columns, rows)
        } else {
            let mut result = conn
                .exec_iter(sql, params_of(params))
                .await
                .map_err(|e| query_error("Failed to execute query", e))?;
            let columns = result.columns_ref().to_vec();
            let rows: Vec<MySqlRow> = result
                .collect()
                .await
                .map_err(|e| query_error("Failed to fetch rows", e))?;
            convert_rows(&columns, rows)
        };

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
        tracing::info!("closing MySQL connection pool");
        self.pool
            .clone()
            .disconnect()
            .await
            .map_err(|e| DaoError::Connection(format!("Failed to close MySQL connection: {}", e)))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        Some(Arc::new(MySqlCancelHandle {
            opts: self.opts.clone(),
            running: self.running.clone(),
        }))
    }
}
