//! Device connection
//!
//! One TCP link per share, connected lazily and at most once per lifetime.
//! A single writer task owns the socket. Callers enqueue complete lines on
//! a bounded channel, so every line reaches the wire whole and in order.

use std::net::Shutdown;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use errors::{IrconError, Result};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::address::DeviceAddress;
use crate::config::BridgeConfig;
use crate::stats::ConnectionStats;

/// Timeouts and queue sizing for a connection
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
    /// Bound on queueing one line for the writer
    pub send_timeout: Duration,
    /// Bound on writing one line to the socket
    pub write_timeout: Duration,
    pub close_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for ConnectionSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            send_timeout: config.send_timeout(),
            write_timeout: config.write_timeout(),
            close_timeout: config.close_timeout(),
            queue_capacity: config.queue_capacity,
        }
    }
}

/// Lifecycle of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Never connected, or closed and ready to connect again
    Idle,
    Connected,
    /// Connect failed, or the writer died on a wire error; stays failed
    /// for the rest of the share's lifetime
    Failed,
}

#[derive(Debug)]
struct LineWriter {
    tx: mpsc::Sender<Bytes>,
    handle: JoinHandle<()>,
}

/// Owned connection to one device
#[derive(Debug)]
pub struct DeviceConnection {
    address: DeviceAddress,
    endpoint: String,
    settings: ConnectionSettings,
    state: LinkState,
    writer: Option<LineWriter>,
    last_error: Option<String>,
    stats: Arc<Mutex<ConnectionStats>>,
}

impl DeviceConnection {
    pub fn new(address: DeviceAddress, settings: ConnectionSettings) -> Self {
        let endpoint = address.to_string();
        Self {
            address,
            endpoint,
            settings,
            state: LinkState::Idle,
            writer: None,
            last_error: None,
            stats: Arc::new(Mutex::new(ConnectionStats::new())),
        }
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Connected with a live writer
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
            && self.writer.as_ref().is_some_and(|w| !w.tx.is_closed())
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Move a link whose writer has stopped to `Failed` and return the
    /// resulting state
    pub fn refresh_state(&mut self) -> LinkState {
        if self.state == LinkState::Connected
            && self.writer.as_ref().map_or(true, |w| w.tx.is_closed())
        {
            self.writer_lost();
        }
        self.state
    }

    fn writer_lost(&mut self) {
        warn!("Writer for {} stopped, marking link failed", self.endpoint);
        // The task has already exited; dropping the handle detaches nothing
        self.writer = None;
        self.state = LinkState::Failed;
        self.last_error = Some("writer stopped after a wire error".to_string());
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats.lock().clone()
    }

    /// Connect once.
    ///
    /// A connected link returns `Ok` without touching the socket. A link whose
    /// earlier connect failed returns `Connection` again without retrying.
    pub async fn connect(&mut self) -> Result<()> {
        match self.state {
            LinkState::Connected => return Ok(()),
            LinkState::Failed => {
                return Err(IrconError::connection(
                    &self.endpoint,
                    format!(
                        "earlier connect failed, not retrying: {}",
                        self.last_error.as_deref().unwrap_or("unknown")
                    ),
                ))
            },
            LinkState::Idle => {},
        }

        self.stats.lock().record_connection_attempt();
        debug!("Connecting to device {}", self.endpoint);

        let result = timeout(
            self.settings.connect_timeout,
            TcpStream::connect((self.address.host.as_str(), self.address.port)),
        )
        .await;
        let stream = match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(self.fail_connect(e.to_string())),
            Err(_) => {
                let reason = format!("timed out after {:?}", self.settings.connect_timeout);
                return Err(self.fail_connect(reason));
            },
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY on {}: {}", self.endpoint, e);
        }

        let (tx, rx) = mpsc::channel(self.settings.queue_capacity);
        let handle = tokio::spawn(run_writer(
            stream,
            rx,
            self.endpoint.clone(),
            self.settings.write_timeout,
            Arc::clone(&self.stats),
        ));

        self.writer = Some(LineWriter { tx, handle });
        self.state = LinkState::Connected;
        self.last_error = None;
        self.stats.lock().record_successful_connection();
        info!("Connected to device {}", self.endpoint);
        Ok(())
    }

    fn fail_connect(&mut self, reason: String) -> IrconError {
        warn!("Connect to {} failed: {}", self.endpoint, reason);
        self.state = LinkState::Failed;
        self.stats.lock().record_failed_connection();
        self.last_error = Some(reason.clone());
        IrconError::connection(&self.endpoint, reason)
    }

    /// Queue one complete line for the writer.
    ///
    /// Wire errors are detected by the writer, which then stops; the next
    /// `send` reports them as `SendFailure` and marks the link failed. A full
    /// queue that does not drain within `send_timeout` is a retryable
    /// `SendFailure`.
    pub async fn send(&mut self, line: Bytes) -> Result<()> {
        let writer = match (&self.state, &self.writer) {
            (LinkState::Connected, Some(writer)) => writer,
            _ => return Err(IrconError::not_connected(&self.endpoint)),
        };

        let result = writer.tx.send_timeout(line, self.settings.send_timeout).await;
        match result {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(IrconError::send_timeout(
                &self.endpoint,
                format!("enqueue timed out after {:?}", self.settings.send_timeout),
            )),
            Err(SendTimeoutError::Closed(_)) => {
                self.writer_lost();
                Err(IrconError::send_failure(
                    &self.endpoint,
                    "writer stopped after a wire error",
                ))
            },
        }
    }

    /// Drain queued lines, shut the socket down in both directions and
    /// return to `Idle`. Idempotent; a failed link stays failed.
    pub async fn close(&mut self) {
        let Some(LineWriter { tx, mut handle }) = self.writer.take() else {
            return;
        };

        drop(tx);
        match timeout(self.settings.close_timeout, &mut handle).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => warn!("Writer for {} ended abnormally: {}", self.endpoint, e),
            Err(_) => {
                warn!(
                    "Writer for {} did not drain within {:?}, aborting",
                    self.endpoint, self.settings.close_timeout
                );
                handle.abort();
            },
        }

        self.state = LinkState::Idle;
        self.stats.lock().record_disconnection();
        info!("Closed connection to device {}", self.endpoint);
    }
}

async fn run_writer(
    mut stream: TcpStream,
    mut rx: mpsc::Receiver<Bytes>,
    endpoint: String,
    write_timeout: Duration,
    stats: Arc<Mutex<ConnectionStats>>,
) {
    while let Some(line) = rx.recv().await {
        match timeout(write_timeout, stream.write_all(&line)).await {
            Ok(Ok(())) => {
                stats.lock().record_line_sent(line.len());
                debug!(
                    endpoint = %endpoint,
                    line = %String::from_utf8_lossy(&line).trim_end(),
                    "Line sent"
                );
            },
            Ok(Err(e)) => {
                warn!("Write to {} failed, dropping link: {}", endpoint, e);
                stats.lock().record_send_failure();
                break;
            },
            Err(_) => {
                warn!("Write to {} timed out after {:?}, dropping link", endpoint, write_timeout);
                stats.lock().record_send_failure();
                break;
            },
        }
    }

    rx.close();
    match stream.into_std() {
        Ok(std_stream) => {
            if let Err(e) = std_stream.shutdown(Shutdown::Both) {
                debug!("Shutdown of {} reported: {}", endpoint, e);
            }
        },
        Err(e) => debug!("Could not detach socket for {}: {}", endpoint, e),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use std::time::Instant;
    use tokio::net::TcpListener;
    use tracing_test::traced_test;

    async fn listener() -> (TcpListener, DeviceAddress) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, DeviceAddress::new("127.0.0.1", port))
    }

    #[tokio::test]
    async fn test_connect_send_close() {
        let (listener, address) = listener().await;
        let mut conn = DeviceConnection::new(address, ConnectionSettings::default());
        assert_eq!(conn.state(), LinkState::Idle);

        conn.connect().await.unwrap();
        assert!(conn.is_connected());
        let (peer, _) = listener.accept().await.unwrap();

        conn.send(Bytes::from_static(b"mode:on,\n")).await.unwrap();
        conn.close().await;
        assert_eq!(conn.state(), LinkState::Idle);

        let mut lines = BufReader::new(peer).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("mode:on,"));
        // Peer sees EOF after shutdown
        assert_eq!(lines.next_line().await.unwrap(), None);

        let stats = conn.stats();
        assert_eq!(stats.lines_sent, 1);
        assert_eq!(stats.bytes_sent, 9);
        assert_eq!(stats.disconnections, 1);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (listener, address) = listener().await;
        let mut conn = DeviceConnection::new(address, ConnectionSettings::default());

        conn.connect().await.unwrap();
        conn.connect().await.unwrap();
        let _peer = listener.accept().await.unwrap();

        assert_eq!(conn.stats().connection_attempts, 1);
        conn.close().await;
    }

    #[tokio::test]
    async fn test_failed_connect_is_permanent() {
        let (listener, address) = listener().await;
        drop(listener);

        let mut conn = DeviceConnection::new(address, ConnectionSettings::default());
        assert!(matches!(
            conn.connect().await,
            Err(IrconError::Connection { .. })
        ));
        assert_eq!(conn.state(), LinkState::Failed);
        assert!(conn.last_error().is_some());

        // No second attempt is made
        assert!(conn.connect().await.is_err());
        assert_eq!(conn.stats().connection_attempts, 1);
        assert_eq!(conn.stats().failed_connections, 1);

        // Close leaves it failed
        conn.close().await;
        assert_eq!(conn.state(), LinkState::Failed);
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let mut conn = DeviceConnection::new(
            DeviceAddress::new("127.0.0.1", 1),
            ConnectionSettings::default(),
        );
        assert!(matches!(
            conn.send(Bytes::from_static(b"\n")).await,
            Err(IrconError::NotConnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_allows_reconnect() {
        let (listener, address) = listener().await;
        let mut conn = DeviceConnection::new(address, ConnectionSettings::default());

        conn.close().await;
        assert_eq!(conn.state(), LinkState::Idle);

        conn.connect().await.unwrap();
        let _first = listener.accept().await.unwrap();
        conn.close().await;
        conn.close().await;
        assert_eq!(conn.stats().disconnections, 1);

        conn.connect().await.unwrap();
        let _second = listener.accept().await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.stats().successful_connections, 2);
        conn.close().await;
    }

    // ========================================================================
    // Timeouts
    // ========================================================================

    /// Large enough that a peer which never reads fills the socket buffers
    fn bulk_line() -> Bytes {
        Bytes::from(vec![b'x'; 256 * 1024])
    }

    /// Send until the first error, giving up after `limit` lines
    async fn send_until_error(conn: &mut DeviceConnection, limit: usize) -> IrconError {
        let line = bulk_line();
        for _ in 0..limit {
            if let Err(e) = conn.send(line.clone()).await {
                return e;
            }
        }
        panic!("no send failed after {} lines", limit);
    }

    #[tokio::test]
    async fn test_connect_timeout_is_bounded() {
        // Non-routable, so the SYN goes nowhere
        let address = DeviceAddress::new("10.255.255.1", 9);
        let settings = ConnectionSettings {
            connect_timeout: Duration::from_millis(50),
            ..ConnectionSettings::default()
        };
        let mut conn = DeviceConnection::new(address, settings);

        let started = Instant::now();
        let err = conn.connect().await.unwrap_err();
        assert!(matches!(err, IrconError::Connection { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(conn.state(), LinkState::Failed);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_full_queue_times_out_then_close_aborts_writer() {
        let (listener, address) = listener().await;
        let settings = ConnectionSettings {
            send_timeout: Duration::from_millis(50),
            write_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_millis(100),
            queue_capacity: 1,
            ..ConnectionSettings::default()
        };
        let mut conn = DeviceConnection::new(address, settings);
        conn.connect().await.unwrap();
        // Accepted but never read
        let (_peer, _) = listener.accept().await.unwrap();

        let err = send_until_error(&mut conn, 400).await;
        assert!(err.is_retryable());
        assert!(err.to_string().contains("enqueue timed out"));
        // The writer is stuck, not dead
        assert_eq!(conn.refresh_state(), LinkState::Connected);

        let started = Instant::now();
        conn.close().await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(conn.state(), LinkState::Idle);
        assert!(logs_contain("did not drain"));
    }

    #[tokio::test]
    async fn test_write_timeout_marks_link_failed() {
        let (listener, address) = listener().await;
        let settings = ConnectionSettings {
            send_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_millis(50),
            ..ConnectionSettings::default()
        };
        let mut conn = DeviceConnection::new(address, settings);
        conn.connect().await.unwrap();
        let (_peer, _) = listener.accept().await.unwrap();

        let err = send_until_error(&mut conn, 2000).await;
        assert!(matches!(err, IrconError::SendFailure { timed_out: false, .. }));
        assert!(!err.is_retryable());
        assert_eq!(conn.state(), LinkState::Failed);
        assert!(!conn.is_connected());
        assert_eq!(conn.stats().send_failures, 1);

        // Failed for good: no reconnect, sends rejected
        assert!(matches!(conn.connect().await, Err(IrconError::Connection { .. })));
        assert!(matches!(
            conn.send(Bytes::from_static(b"\n")).await,
            Err(IrconError::NotConnected { .. })
        ));
    }
}
