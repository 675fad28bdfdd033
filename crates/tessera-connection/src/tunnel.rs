//! SSH port-forwarding tunnels
//!
//! A tunnel listens on an ephemeral `127.0.0.1` port and forwards every
//! accepted socket through an ssh2 `direct-tcpip` channel to the database
//! host as seen from the SSH server. Dropping the tunnel stops forwarding and
//! disconnects the session.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use ssh2::Session;
use tessera_core::{DaoError, Result, SshTunnelConfig};
use tracing::{debug, error, info, warn};

/// Error types for SSH tunnel operations
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("Failed to connect to SSH server {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    #[error("SSH handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("SSH authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Failed to bind local tunnel port: {0}")]
    BindFailed(std::io::Error),

    #[error("SSH tunnel setup failed: {0}")]
    Setup(String),
}

impl From<TunnelError> for DaoError {
    fn from(err: TunnelError) -> Self {
        DaoError::Tunnel(err.to_string())
    }
}

/// A live forwarding tunnel owned by a cache entry
pub trait Tunnel: Send + Sync {
    /// Local port the engine client connects to
    fn local_port(&self) -> u16;

    /// Whether forwarding is still running
    fn is_active(&self) -> bool;
}

/// Opens tunnels for the connection cache
#[async_trait]
pub trait TunnelFactory: Send + Sync {
    async fn open(
        &self,
        config: &SshTunnelConfig,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Box<dyn Tunnel>>;
}

/// Default factory backed by ssh2
#[derive(Debug, Default, Clone, Copy)]
pub struct Ssh2TunnelFactory;

#[async_trait]
impl TunnelFactory for Ssh2TunnelFactory {
    async fn open(
        &self,
        config: &SshTunnelConfig,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Box<dyn Tunnel>> {
        let config = config.clone();
        let remote_host = remote_host.to_string();
        // ssh2 is blocking
        let tunnel = tokio::task::spawn_blocking(move || {
            SshTunnel::open(&config, &remote_host, remote_port)
        })
        .await
        .map_err(|e| DaoError::Tunnel(format!("tunnel setup task failed: {}", e)))??;
        Ok(Box::new(tunnel))
    }
}

/// ssh2-backed tunnel
pub struct SshTunnel {
    session: Session,
    local_port: u16,
    remote_host: String,
    remote_port: u16,
    is_running: Arc<AtomicBool>,
    forward_thread: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for SshTunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTunnel")
            .field("local_port", &self.local_port)
            .field("remote_host", &self.remote_host)
            .field("remote_port", &self.remote_port)
            .field("is_running", &self.is_running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SshTunnel {
    /// Connect, authenticate with the in-memory key and start forwarding.
    ///
    /// Blocking; call from a blocking-capable thread.
    pub fn open(
        config: &SshTunnelConfig,
        remote_host: &str,
        remote_port: u16,
    ) -> std::result::Result<Self, TunnelError> {
        config
            .validate()
            .map_err(|e| TunnelError::Setup(e.to_string()))?;

        info!(
            ssh_host = %config.host,
            ssh_port = config.port,
            remote_host = %remote_host,
            remote_port,
            "establishing SSH tunnel"
        );

        let timeout = Duration::from_secs(config.timeout_seconds);
        let connect_failed = |source: std::io::Error| TunnelError::ConnectionFailed {
            host: config.host.clone(),
            port: config.port,
            source,
        };
        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(connect_failed)?
            .next()
            .ok_or_else(|| {
                connect_failed(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "host did not resolve",
                ))
            })?;
        let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(connect_failed)?;
        tcp.set_read_timeout(Some(timeout)).map_err(connect_failed)?;
        tcp.set_write_timeout(Some(timeout)).map_err(connect_failed)?;

        let mut session = Session::new().map_err(|e| TunnelError::Setup(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| TunnelError::HandshakeFailed(e.to_string()))?;

        session
            .userauth_pubkey_memory(
                &config.username,
                None,
                &config.private_key,
                config.passphrase.as_deref(),
            )
            .map_err(|e| TunnelError::AuthenticationFailed(e.to_string()))?;
        if !session.authenticated() {
            return Err(TunnelError::AuthenticationFailed(
                "authentication not confirmed".to_string(),
            ));
        }
        debug!("SSH authentication successful");

        if config.keepalive_seconds > 0 {
            session.set_keepalive(true, config.keepalive_seconds as u32);
        }

        // Bound once and handed to the forwarding thread, so the port cannot
        // be taken between picking and binding it.
        let listener = TcpListener::bind("127.0.0.1:0").map_err(TunnelError::BindFailed)?;
        let local_port = listener
            .local_addr()
            .map_err(TunnelError::BindFailed)?
            .port();
        listener
            .set_nonblocking(true)
            .map_err(TunnelError::BindFailed)?;

        let is_running = Arc::new(AtomicBool::new(true));
        let forward_thread = start_forwarding_thread(
            listener,
            session.clone(),
            remote_host.to_string(),
            remote_port,
            is_running.clone(),
        );

        info!(
            local_port,
            remote = format!("{}:{}", remote_host, remote_port),
            "SSH tunnel established"
        );

        Ok(Self {
            session,
            local_port,
            remote_host: remote_host.to_string(),
            remote_port,
            is_running,
            forward_thread: Some(forward_thread),
        })
    }

    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }
}

impl Tunnel for SshTunnel {
    fn local_port(&self) -> u16 {
        self.local_port
    }

    fn is_active(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        info!(local_port = self.local_port, "closing SSH tunnel");

        self.is_running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.forward_thread.take() {
            let _ = handle.join();
        }

        if let Err(e) = self.session.disconnect(None, "Tunnel closed", None) {
            warn!("error disconnecting SSH session: {}", e);
        }
    }
}

fn start_forwarding_thread(
    listener: TcpListener,
    session: Session,
    remote_host: String,
    remote_port: u16,
    is_running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while is_running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((local_stream, _)) => {
                    let session = session.clone();
                    let remote_host = remote_host.clone();
                    let is_running = is_running.clone();

                    thread::spawn(move || {
                        if let Err(e) = forward_connection(
                            local_stream,
                            &session,
                            &remote_host,
                            remote_port,
                            &is_running,
                        ) {
                            debug!("tunnel connection ended with error: {}", e);
                        }
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    if is_running.load(Ordering::SeqCst) {
                        error!("error accepting tunnel connection: {}", e);
                    }
                    is_running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
        debug!("port forwarding thread exiting");
    })
}

/// Pump bytes both ways between one local socket and one SSH channel
fn forward_connection(
    mut local_stream: TcpStream,
    session: &Session,
    remote_host: &str,
    remote_port: u16,
    is_running: &AtomicBool,
) -> std::io::Result<()> {
    local_stream.set_nonblocking(false)?;
    local_stream.set_read_timeout(Some(Duration::from_millis(100)))?;

    let mut channel = session
        .channel_direct_tcpip(remote_host, remote_port, None)
        .map_err(std::io::Error::other)?;

    session.set_blocking(false);

    let mut local_buf = [0u8; 8192];
    let mut remote_buf = [0u8; 8192];

    while is_running.load(Ordering::SeqCst) {
        let mut activity = false;

        match local_stream.read(&mut local_buf) {
            Ok(0) => break,
            Ok(n) => {
                session.set_blocking(true);
                channel.write_all(&local_buf[..n])?;
                session.set_blocking(false);
                activity = true;
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(e) => return Err(e),
        }

        match channel.read(&mut remote_buf) {
            Ok(0) => {
                if channel.eof() {
                    break;
                }
            }
            Ok(n) => {
                local_stream.write_all(&remote_buf[..n])?;
                activity = true;
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }

        if !activity {
            thread::sleep(Duration::from_millis(1));
        }
    }

    session.set_blocking(true);
    let _ = channel.send_eof();
    let _ = channel.wait_close();
    Ok(())
}

#[cfg(test)]
mod tests;
