use super::*;
use crate::testing::MockConnection;
use std::time::Duration;

#[tokio::test]
async fn test_ping_healthy_connection() {
    let conn = MockConnection::new(0);
    let latency = ping_connection(&conn, Duration::from_secs(1)).await.unwrap();
    assert!(latency < Duration::from_secs(1));
}

#[tokio::test]
async fn test_ping_closed_connection() {
    let conn = MockConnection::new(0);
    conn.close().await.unwrap();
    assert_eq!(
        ping_connection(&conn, Duration::from_secs(1)).await,
        Err(PingError::ConnectionClosed)
    );
}

#[tokio::test]
async fn test_ping_failing_connection() {
    let conn = MockConnection::new(0);
    conn.break_link();
    let err = ping_connection(&conn, Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, PingError::QueryFailed(_)));
}

#[tokio::test(start_paused = true)]
async fn test_ping_times_out() {
    let conn = MockConnection::new(0).with_ping_delay(Duration::from_secs(30));
    let err = ping_connection(&conn, Duration::from_millis(100)).await.unwrap_err();
    assert_eq!(err, PingError::Timeout(Duration::from_millis(100)));
}
