//! Liveness probing for cached clients
//!
//! Provides lightweight health checking by running the client's cheapest
//! round trip (`SELECT 1`, `PING`) under a timeout and measuring response
//! time.

use std::time::{Duration, Instant};

use tessera_core::Connection;

/// Result of a ping operation
pub type PingResult = Result<Duration, PingError>;

/// Error that can occur during a ping operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PingError {
    #[error("Connection is closed")]
    ConnectionClosed,
    #[error("Ping query failed: {0}")]
    QueryFailed(String),
    #[error("Ping timed out after {0:?}")]
    Timeout(Duration),
}

/// Ping a client to check it is still usable.
///
/// Returns the round-trip time on success.
pub async fn ping_connection(conn: &dyn Connection, timeout: Duration) -> PingResult {
    if conn.is_closed() {
        return Err(PingError::ConnectionClosed);
    }

    let start = Instant::now();
    match tokio::time::timeout(timeout, conn.ping()).await {
        Ok(Ok(())) => Ok(start.elapsed()),
        Ok(Err(e)) => Err(PingError::QueryFailed(e.to_string())),
        Err(_) => Err(PingError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests;
