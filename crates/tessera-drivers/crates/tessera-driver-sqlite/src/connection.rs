//! SQLite connection implementation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, InterruptHandle, OpenFlags, params_from_iter};
use tessera_core::{
    ColumnMeta, Connection, DaoError, QueryCancelHandle, QueryResult, Result, Row,
    StatementResult, Value,
};

/// Cancel handle wrapping the rusqlite `InterruptHandle`; the interrupted
/// statement fails with SQLITE_INTERRUPT
pub struct SqliteCancelHandle {
    interrupt_handle: Arc<InterruptHandle>,
}

impl QueryCancelHandle for SqliteCancelHandle {
    fn cancel(&self) {
        tracing::debug!("interrupting SQLite statement");
        self.interrupt_handle.interrupt();
    }
}

/// Interrupts the statement when the awaiting future is dropped mid-flight
struct InterruptOnDrop {
    handle: Arc<InterruptHandle>,
    armed: bool,
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("statement abandoned, interrupting");
            self.handle.interrupt();
        }
    }
}

/// SQLite connection wrapper.
///
/// rusqlite is blocking, so every statement runs on the blocking pool while
/// the connection mutex serializes callers.
pub struct SqliteConnection {
    conn: Arc<Mutex<RusqliteConnection>>,
    interrupt_handle: Arc<InterruptHandle>,
    closed: AtomicBool,
}

impl SqliteConnection {
    /// Open (or create) a database file; `:memory:` opens a private
    /// in-memory database
    pub fn open(path: &str) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database");
        let expanded_path = Self::expand_path(path)?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if path == ":memory:" {
            RusqliteConnection::open_in_memory().map_err(|e| {
                DaoError::Connection(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            if !expanded_path.starts_with("file:") {
                let file_path = std::path::Path::new(&expanded_path);
                if let Some(parent) = file_path.parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.exists()
                {
                    return Err(DaoError::Connection(format!(
                        "Parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }

            RusqliteConnection::open_with_flags(&expanded_path, flags).map_err(|e| {
                DaoError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    expanded_path, e
                ))
            })?
        };

        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| DaoError::Connection(format!("Failed to enable foreign keys: {}", e)))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| DaoError::Connection(format!("Failed to set busy timeout: {}", e)))?;

        let interrupt_handle = Arc::new(conn.get_interrupt_handle());

        tracing::info!(path = %expanded_path, "SQLite database connection established");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt_handle,
            closed: AtomicBool::new(false),
        })
    }

    /// Expand `~/` and make relative paths absolute
    pub(crate) fn expand_path(path: &str) -> Result<String> {
        if path == ":memory:" || path.starts_with("file:") {
            return Ok(path.to_string());
        }

        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            match std::env::var_os("HOME") {
                Some(home) => std::path::PathBuf::from(home)
                    .join(rest)
                    .to_string_lossy()
                    .to_string(),
                None => {
                    return Err(DaoError::Configuration(
                        "Unable to determine HOME directory".into(),
                    ));
                }
            }
        } else if path.starts_with('~') {
            return Err(DaoError::Configuration(
                "User-specific home directories (~user) are not supported".into(),
            ));
        } else {
            path.to_string()
        };

        let path_buf = std::path::PathBuf::from(&expanded);
        if path_buf.is_relative() {
            Ok(std::env::current_dir()?
                .join(path_buf)
                .to_string_lossy()
                .to_string())
        } else {
            Ok(expanded)
        }
    }

    /// Run `work` against the locked connection on the blocking pool
    async fn with_conn<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&RusqliteConnection) -> Result<T> + Send + 'static,
    {
        if self.is_closed() {
            return Err(DaoError::Connection("SQLite connection is closed".into()));
        }
        let conn = self.conn.clone();
        let mut guard = InterruptOnDrop {
            handle: self.interrupt_handle.clone(),
            armed: true,
        };
        let outcome = tokio::task::spawn_blocking(move || work(&conn.lock())).await;
        guard.armed = false;
        outcome.map_err(|e| DaoError::Driver(format!("SQLite worker failed: {}", e)))?
    }
}

fn query_error(context: &str, err: rusqlite::Error) -> DaoError {
    if let rusqlite::Error::SqliteFailure(code, _) = &err
        && code.code == rusqlite::ErrorCode::OperationInterrupted
    {
        return DaoError::Cancelled;
    }
    DaoError::Query(format!("{}: {}", context, err))
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let sql = sql.to_string();
        let params = values_to_rusqlite(params);
        let result = self
            .with_conn(move |conn| {
                let affected = conn
                    .execute(&sql, params_from_iter(params.iter()))
                    .map_err(|e| query_error("Failed to execute statement", e))?;
                Ok(StatementResult {
                    affected_rows: affected as u64,
                    last_insert_id: (affected > 0).then(|| conn.last_insert_rowid()),
                })
            })
            .await?;

        tracing::debug!(affected_rows = result.affected_rows, "statement executed");
        Ok(result)
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let sql = sql.to_string();
        let params = values_to_rusqlite(params);

        let (columns, rows) = self
            .with_conn(move |conn| {
                let mut stmt = conn
                    .prepare(&sql)
                    .map_err(|e| query_error("Failed to prepare query", e))?;

                let columns: Vec<ColumnMeta> = stmt
                    .columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| ColumnMeta {
                        name: col.name().to_string(),
                        data_type: col.decl_type().unwrap_or("DYNAMIC").to_string(),
                        nullable: true,
                        ordinal: idx,
                    })
                    .collect();
                let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

                let mut rows = Vec::new();
                let mut query_rows = stmt
                    .query(params_from_iter(params.iter()))
                    .map_err(|e| query_error("Failed to execute query", e))?;
                while let Some(row) = query_rows
                    .next()
                    .map_err(|e| query_error("Failed to fetch row", e))?
                {
                    let mut values = Vec::with_capacity(column_names.len());
                    for i in 0..column_names.len() {
                        values.push(rusqlite_to_value(row, i)?);
                    }
                    rows.push(Row::new(column_names.clone(), values));
                }
                Ok((columns, rows))
            })
            .await?;

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms = execution_time_ms,
            "query executed successfully"
        );
        Ok(QueryResult {
            id: uuid::Uuid::new_v4(),
            columns,
            rows,
            affected_rows: 0,
            execution_time_ms,
        })
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("closing SQLite connection");
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        Some(Arc::new(SqliteCancelHandle {
            interrupt_handle: self.interrupt_handle.clone(),
        }))
    }
}

fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values.iter().map(value_to_rusqlite).collect()
}

pub(crate) fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Int8(i) => Sql::Integer(i64::from(*i)),
        Value::Int16(i) => Sql::Integer(i64::from(*i)),
        Value::Int32(i) => Sql::Integer(i64::from(*i)),
        Value::Int64(i) => Sql::Integer(*i),
        Value::Float32(f) => Sql::Real(f64::from(*f)),
        Value::Float64(f) => Sql::Real(*f),
        Value::Decimal(d) => Sql::Text(d.clone()),
        Value::String(s) => Sql::Text(s.clone()),
        Value::Bytes(b) => Sql::Blob(b.clone()),
        Value::Date(d) => Sql::Text(d.to_string()),
        Value::Time(t) => Sql::Text(t.to_string()),
        Value::DateTime(dt) => Sql::Text(dt.to_string()),
        Value::DateTimeUtc(dt) => Sql::Text(dt.to_rfc3339()),
        Value::Json(j) => Sql::Text(j.to_string()),
        Value::Uuid(u) => Sql::Text(u.to_string()),
        Value::Array(_) => Sql::Text(value.to_json().to_string()),
    }
}

pub(crate) fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| DaoError::Query(e.to_string()))?;

    Ok(match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        // Blobs holding valid UTF-8 are text stored without a declared type
        ValueRef::Blob(b) => match std::str::from_utf8(b) {
            Ok(s) => Value::String(s.to_string()),
            Err(_) => Value::Bytes(b.to_vec()),
        },
    })
}
