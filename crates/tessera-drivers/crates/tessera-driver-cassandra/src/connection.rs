//! Cassandra connection over a scylla session

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use scylla::Session;
use scylla::frame::response::result::CqlValue;
use scylla::transport::errors::{DbError, QueryError};
use tessera_core::{
    ColumnMeta, Connection, DaoError, QueryResult, Result, Row, StatementResult, Value,
};

/// Column a conditional (`IF ...`) statement reports its outcome in
pub(crate) const APPLIED_COLUMN: &str = "[applied]";

/// Column a `SELECT JSON` row arrives in
pub(crate) const JSON_COLUMN: &str = "[json]";

/// Cassandra session wrapper implementing the Connection trait.
///
/// Statements are plain CQL text. Values are inlined by the caller, so
/// `params` must be empty.
pub struct CassandraConnection {
    session: Session,
    closed: AtomicBool,
    broken: AtomicBool,
}

impl CassandraConnection {
    /// Wrap a session and verify it with a read of `system.local`
    pub async fn connect(session: Session) -> Result<Self> {
        let connection = Self {
            session,
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(false),
        };
        connection.ping().await?;
        tracing::debug!("Cassandra session established");
        Ok(connection)
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DaoError::Connection("Cassandra session is closed".to_string()));
        }
        Ok(())
    }

    fn ensure_inlined(params: &[Value]) -> Result<()> {
        if params.is_empty() {
            Ok(())
        } else {
            Err(DaoError::NotSupported(
                "Cassandra statements take inlined literals, not bound parameters".to_string(),
            ))
        }
    }

    async fn run(&self, cql: &str, params: &[Value]) -> Result<QueryResult> {
        self.ensure_not_closed()?;
        Self::ensure_inlined(params)?;
        let start = Instant::now();

        let result = self.session.query_unpaged(cql, ()).await.map_err(|e| {
            let error = query_error("Cassandra statement failed", e);
            if error.is_connectivity() {
                self.broken.store(true, Ordering::SeqCst);
            }
            error
        })?;

        let names: Vec<String> = result
            .col_specs()
            .iter()
            .map(|spec| spec.name.clone())
            .collect();
        let rows: Vec<Row> = result
            .rows
            .unwrap_or_default()
            .into_iter()
            .map(|row| {
                Row::new(
                    names.clone(),
                    row.columns.into_iter().map(cql_to_value).collect(),
                )
            })
            .collect();

        let execution_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(rows = rows.len(), duration_ms = execution_time_ms, "statement completed");
        Ok(QueryResult {
            id: uuid::Uuid::new_v4(),
            columns: names
                .iter()
                .enumerate()
                .map(|(ordinal, name)| ColumnMeta {
                    name: name.clone(),
                    data_type: "cql".to_string(),
                    nullable: true,
                    ordinal,
                })
                .collect(),
            rows,
            affected_rows: 0,
            execution_time_ms,
        })
    }
}

/// Classify a driver error. Server-side timeouts are timeouts, overload and
/// authentication problems are connectivity errors, other server rejections
/// are query errors and anything the driver raised itself is connectivity.
pub(crate) fn query_error(context: &str, error: QueryError) -> DaoError {
    match &error {
        QueryError::DbError(DbError::ReadTimeout { .. } | DbError::WriteTimeout { .. }, _) => {
            DaoError::Timeout(format!("{}: {}", context, error))
        }
        QueryError::DbError(
            DbError::AuthenticationError
            | DbError::Unavailable { .. }
            | DbError::Overloaded
            | DbError::IsBootstrapping,
            _,
        ) => DaoError::Connection(format!("{}: {}", context, error)),
        QueryError::DbError(..) | QueryError::BadQuery(_) => {
            DaoError::Query(format!("{}: {}", context, error))
        }
        _ => DaoError::Connection(format!("{}: {}", context, error)),
    }
}

/// Map a cell onto the shared value model; types without a counterpart
/// arrive as their debug text
pub(crate) fn cql_to_value(cell: Option<CqlValue>) -> Value {
    let Some(cell) = cell else {
        return Value::Null;
    };
    match cell {
        CqlValue::Empty => Value::Null,
        CqlValue::Ascii(s) | CqlValue::Text(s) => Value::String(s),
        CqlValue::Boolean(b) => Value::Bool(b),
        CqlValue::TinyInt(n) => Value::Int8(n),
        CqlValue::SmallInt(n) => Value::Int16(n),
        CqlValue::Int(n) => Value::Int32(n),
        CqlValue::BigInt(n) => Value::Int64(n),
        CqlValue::Counter(counter) => Value::Int64(counter.0),
        CqlValue::Timestamp(ts) => Value::Int64(ts.0),
        CqlValue::Float(f) => Value::Float32(f),
        CqlValue::Double(f) => Value::Float64(f),
        CqlValue::Uuid(id) => Value::Uuid(id),
        CqlValue::Blob(bytes) => Value::Bytes(bytes),
        CqlValue::Inet(addr) => Value::String(addr.to_string()),
        CqlValue::List(items) | CqlValue::Set(items) => {
            Value::Array(items.into_iter().map(|item| cql_to_value(Some(item))).collect())
        }
        other => Value::String(format!("{:?}", other)),
    }
}

/// Outcome of a conditional statement, `None` for unconditional ones
pub(crate) fn applied(result: &QueryResult) -> Option<bool> {
    let row = result.rows.first()?;
    match row.get_by_name(APPLIED_COLUMN)? {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

#[async_trait]
impl Connection for CassandraConnection {
    fn driver_name(&self) -> &str {
        "cassandra"
    }

    /// Conditional statements affect one row when applied and none
    /// otherwise; unconditional writes report one
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let result = self.run(sql, params).await?;
        let affected_rows = match applied(&result) {
            Some(applied) => u64::from(applied),
            None => 1,
        };
        Ok(StatementResult {
            affected_rows,
            last_insert_id: None,
        })
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.run(sql, params).await
    }

    async fn ping(&self) -> Result<()> {
        self.run("SELECT release_version FROM system.local", &[])
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("Cassandra session closed");
        Ok(())
    }

    /// A session that lost every node is retired so the cache builds a new one
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.broken.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CassandraConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CassandraConnection")
            .field("closed", &self.is_closed())
            .finish()
    }
}
