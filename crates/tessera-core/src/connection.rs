//! Connection trait implemented by every engine client

use crate::{QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// Handle for cancelling a running query from any thread.
///
/// Calling it more than once is a no-op, as is calling it while nothing runs.
pub trait QueryCancelHandle: Send + Sync {
    /// Cancel the currently running query on the associated connection.
    fn cancel(&self);
}

/// A live client for one engine.
///
/// Clients are shared between concurrent callers through the connection
/// cache, so implementations serialize access internally where the
/// underlying driver requires it.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite", "postgres", "mysql")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE/DDL)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a statement that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Cheapest round trip proving the client still works.
    ///
    /// The default runs `SELECT 1`; non-SQL engines override it.
    async fn ping(&self) -> Result<()> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;

    /// Get a handle that can be used to cancel running queries.
    ///
    /// Returns `None` if the driver does not support query cancellation.
    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        None
    }
}
