//! Redis connection over a multiplexed tokio client

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tessera_core::{
    ColumnMeta, Connection, DaoError, QueryResult, Result, Row, RowRecord, StatementResult, Value,
};

/// Name of the single column a command reply is returned in
pub(crate) const REPLY_COLUMN: &str = "reply";

/// Redis connection wrapper implementing the Connection trait.
///
/// `sql` is a command line: the first word is the command, the remaining
/// words are arguments, and `params` are appended as further arguments
/// without any splitting. Keys containing whitespace must go through
/// `params`.
pub struct RedisConnection {
    connection: MultiplexedConnection,
    database: i64,
    closed: AtomicBool,
    broken: AtomicBool,
}

impl RedisConnection {
    /// Open a multiplexed connection and verify it with `PING`, which
    /// surfaces authentication errors before the client is cached
    pub async fn connect(info: redis::ConnectionInfo) -> Result<Self> {
        let database = info.redis.db;
        let client = redis::Client::open(info).map_err(|e| {
            DaoError::Configuration(format!("Failed to create Redis client: {}", e))
        })?;
        let mut connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| command_error("Failed to connect to Redis", e))?;

        let pong: redis::RedisResult<String> =
            redis::cmd("PING").query_async(&mut connection).await;
        match pong {
            Ok(response) if response != "PONG" => {
                tracing::warn!(response = %response, "unexpected PING response");
            }
            Ok(_) => {}
            Err(e) => return Err(command_error("Redis connection verification failed", e)),
        }

        tracing::debug!(database, "Redis connection established");
        Ok(Self {
            connection,
            database,
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(false),
        })
    }

    /// Logical database index selected at connect time
    pub fn database(&self) -> i64 {
        self.database
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DaoError::Connection("Redis connection is closed".to_string()));
        }
        Ok(())
    }

    async fn run(&self, text: &str, params: &[Value]) -> Result<redis::Value> {
        self.ensure_not_closed()?;
        let (name, cmd) = build_command(text, params)?;
        let start = Instant::now();

        // Multiplexed handles are cheap clones sharing one socket
        let mut connection = self.connection.clone();
        let reply: redis::RedisResult<redis::Value> = cmd.query_async(&mut connection).await;
        let reply = reply.map_err(|e| {
            let error = command_error(&format!("Redis command {} failed", name), e);
            if error.is_connectivity() {
                self.broken.store(true, Ordering::SeqCst);
            }
            error
        })?;

        tracing::debug!(
            command = %name,
            duration_ms = start.elapsed().as_millis() as u64,
            "command completed"
        );
        Ok(reply)
    }
}

/// Split a command line into a `redis::Cmd`; returns the upper-cased
/// command name alongside
pub(crate) fn build_command(text: &str, params: &[Value]) -> Result<(String, redis::Cmd)> {
    let mut words = text.split_whitespace();
    let Some(name) = words.next() else {
        return Err(DaoError::Validation("Empty Redis command".to_string()));
    };
    let name = name.to_uppercase();
    let mut cmd = redis::cmd(&name);
    for word in words {
        cmd.arg(word);
    }
    for param in params {
        match param {
            Value::String(s) | Value::Decimal(s) => cmd.arg(s.as_str()),
            Value::Int64(n) => cmd.arg(*n),
            Value::Float64(f) => cmd.arg(*f),
            Value::Bool(b) => cmd.arg(if *b { "1" } else { "0" }),
            Value::Bytes(b) => cmd.arg(b.as_slice()),
            Value::Null => cmd.arg(""),
            Value::Json(json) => cmd.arg(json.to_string()),
            other => cmd.arg(other.to_string()),
        };
    }
    Ok((name, cmd))
}

/// Classify a client error: authentication and socket problems are
/// connectivity errors, everything else is a command error
pub(crate) fn command_error(context: &str, error: redis::RedisError) -> DaoError {
    let auth = error.kind() == redis::ErrorKind::AuthenticationFailed
        || matches!(error.code(), Some("NOAUTH" | "WRONGPASS"));
    if auth {
        DaoError::Connection(format!("{}: authentication failed: {}", context, error))
    } else if error.is_timeout() {
        DaoError::Timeout(format!("{}: {}", context, error))
    } else if error.is_io_error() || error.is_connection_dropped() || error.is_connection_refusal()
    {
        DaoError::Connection(format!("{}: {}", context, error))
    } else {
        DaoError::Query(format!("{}: {}", context, error))
    }
}

/// JSON shape of a reply; bulk strings are decoded lossily as UTF-8
pub(crate) fn reply_to_json(reply: &redis::Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match reply {
        redis::Value::Nil => Json::Null,
        redis::Value::Int(n) => Json::from(*n),
        redis::Value::BulkString(data) => Json::String(String::from_utf8_lossy(data).into_owned()),
        redis::Value::SimpleString(s) => Json::String(s.clone()),
        redis::Value::Okay => Json::String("OK".to_string()),
        redis::Value::Double(d) => serde_json::Number::from_f64(*d)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        redis::Value::Boolean(b) => Json::Bool(*b),
        redis::Value::BigNumber(n) => Json::String(n.to_string()),
        redis::Value::VerbatimString { text, .. } => Json::String(text.clone()),
        redis::Value::Array(items) | redis::Value::Set(items) => {
            Json::Array(items.iter().map(reply_to_json).collect())
        }
        redis::Value::Push { data, .. } => Json::Array(data.iter().map(reply_to_json).collect()),
        redis::Value::Map(pairs) => Json::Object(
            pairs
                .iter()
                .map(|(k, v)| (json_text(&reply_to_json(k)), reply_to_json(v)))
                .collect(),
        ),
        redis::Value::Attribute { data, .. } => reply_to_json(data),
        redis::Value::ServerError(err) => Json::String(format!("ERROR: {:?}", err)),
    }
}

/// Text of a scalar JSON value, without quotes for strings
pub(crate) fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn reply_to_value(reply: &redis::Value) -> Value {
    match reply_to_json(reply) {
        json @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => Value::Json(json),
        scalar => Value::from_json(&scalar),
    }
}

/// The reply carried by a [`RedisConnection::query`] result
pub(crate) fn reply_of(result: &QueryResult) -> serde_json::Value {
    result
        .scalar()
        .map(Value::to_json)
        .unwrap_or(serde_json::Value::Null)
}

/// Lay a reply out as records for passthrough callers: one record per
/// element of an array, one per entry of a map, a single record for a
/// scalar and none for nil
pub(crate) fn reply_records(reply: &serde_json::Value) -> Vec<RowRecord> {
    use serde_json::Value as Json;
    let record = |key: Json, value: Json| {
        let mut row = RowRecord::new();
        row.insert("key".to_string(), key);
        row.insert("value".to_string(), value);
        row
    };
    match reply {
        Json::Null => Vec::new(),
        Json::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| record(Json::from(i), v.clone()))
            .collect(),
        Json::Object(map) => map
            .iter()
            .map(|(k, v)| record(Json::String(k.clone()), v.clone()))
            .collect(),
        scalar => vec![record(Json::Null, scalar.clone())],
    }
}

#[async_trait]
impl Connection for RedisConnection {
    fn driver_name(&self) -> &str {
        "redis"
    }

    /// `affected_rows` is the integer reply, or 1 for any other non-nil reply
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let reply = self.run(sql, params).await?;
        let affected_rows = match &reply {
            redis::Value::Int(n) => (*n).max(0) as u64,
            redis::Value::Nil => 0,
            _ => 1,
        };
        Ok(StatementResult {
            affected_rows,
            last_insert_id: None,
        })
    }

    /// The whole reply as one row with a single [`REPLY_COLUMN`]; arrays
    /// and maps arrive as JSON
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start = Instant::now();
        let reply = self.run(sql, params).await?;
        Ok(QueryResult {
            id: uuid::Uuid::new_v4(),
            columns: vec![ColumnMeta {
                name: REPLY_COLUMN.to_string(),
                data_type: "reply".to_string(),
                nullable: true,
                ordinal: 0,
            }],
            rows: vec![Row::new(vec![REPLY_COLUMN.to_string()], vec![reply_to_value(&reply)])],
            affected_rows: 0,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn ping(&self) -> Result<()> {
        self.run("PING", &[]).await.map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("Redis connection closed");
        Ok(())
    }

    /// A dropped socket retires the client so the cache opens a new one
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.broken.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection")
            .field("database", &self.database)
            .field("closed", &self.is_closed())
            .finish()
    }
}
