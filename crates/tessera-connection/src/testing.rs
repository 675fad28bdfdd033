//! Test doubles for cache tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tessera_core::{
    Connection, ConnectionParams, DaoError, QueryResult, Result, SshTunnelConfig, StatementResult,
    Value,
};

use crate::cache::{ClientProvisioner, Endpoint};
use crate::tunnel::{Tunnel, TunnelFactory};

/// Mock connection for testing
pub(crate) struct MockConnection {
    pub(crate) id: usize,
    closed: AtomicBool,
    broken: Arc<AtomicBool>,
    ping_delay: Option<Duration>,
}

impl MockConnection {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            closed: AtomicBool::new(false),
            broken: Arc::new(AtomicBool::new(false)),
            ping_delay: None,
        }
    }

    pub(crate) fn with_ping_delay(mut self, delay: Duration) -> Self {
        self.ping_delay = Some(delay);
        self
    }

    /// Make every following query fail, as after a dropped socket
    pub(crate) fn break_link(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        Ok(StatementResult::default())
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        if let Some(delay) = self.ping_delay {
            tokio::time::sleep(delay).await;
        }
        if self.broken.load(Ordering::SeqCst) {
            return Err(DaoError::Connection("server closed the connection".into()));
        }
        Ok(QueryResult::empty())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Provisioner that counts connections created
pub(crate) struct MockProvisioner {
    counter: AtomicUsize,
    delay: Duration,
    fail: AtomicBool,
    pub(crate) endpoints: parking_lot::Mutex<Vec<Endpoint>>,
    pub(crate) created: parking_lot::Mutex<Vec<Arc<MockConnection>>>,
}

impl MockProvisioner {
    pub(crate) fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            delay: Duration::from_millis(20),
            fail: AtomicBool::new(false),
            endpoints: parking_lot::Mutex::new(Vec::new()),
            created: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        let provisioner = Self::new();
        provisioner.fail.store(true, Ordering::SeqCst);
        provisioner
    }

    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientProvisioner for MockProvisioner {
    async fn connect(
        &self,
        _params: &ConnectionParams,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn Connection>> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().push(endpoint.clone());
        tokio::time::sleep(self.delay).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(DaoError::Connection("password authentication failed".into()));
        }
        let conn = Arc::new(MockConnection::new(id));
        self.created.lock().push(conn.clone());
        Ok(conn)
    }
}

pub(crate) struct MockTunnel {
    port: u16,
    active: Arc<AtomicBool>,
}

impl Tunnel for MockTunnel {
    fn local_port(&self) -> u16 {
        self.port
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Tunnel factory that counts tunnels opened
pub(crate) struct MockTunnelFactory {
    opened: AtomicUsize,
    pub(crate) active: Arc<AtomicBool>,
}

impl MockTunnelFactory {
    pub(crate) fn new() -> Self {
        Self {
            opened: AtomicUsize::new(0),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TunnelFactory for MockTunnelFactory {
    async fn open(
        &self,
        _config: &SshTunnelConfig,
        _remote_host: &str,
        _remote_port: u16,
    ) -> Result<Box<dyn Tunnel>> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(Box::new(MockTunnel {
            port: 40_000 + n as u16,
            active: self.active.clone(),
        }))
    }
}
