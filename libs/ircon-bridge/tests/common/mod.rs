//! Shared helpers for bridge integration tests
//!
//! `DeviceSimulator` stands in for the controller: it accepts any number of
//! connections and records every received line (without the trailing `\n`).

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};

use ircon_bridge::{BridgeConfig, ColumnDef, ColumnType, IrconEngine, TableSchema};

pub struct DeviceSimulator {
    addr: SocketAddr,
    lines: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl DeviceSimulator {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let handle = {
            let lines = Arc::clone(&lines);
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let lines = Arc::clone(&lines);
                    tokio::spawn(async move {
                        let mut framed = FramedRead::new(stream, LinesCodec::new());
                        while let Some(Ok(line)) = framed.next().await {
                            lines.lock().await.push(line);
                        }
                    });
                }
            })
        };

        Self {
            addr,
            lines,
            connections,
            handle,
        }
    }

    /// Table identifier pointing at this simulator
    pub fn identifier(&self) -> String {
        format!("127.0.0.1:{}", self.addr.port())
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub async fn lines(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }

    /// Wait until at least `count` lines have arrived, then return them all
    pub async fn wait_for_lines(&self, count: usize) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let lines = self.lines().await;
            if lines.len() >= count {
                return lines;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {} lines, got {:?}",
                count,
                lines
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until `count` connections have been accepted
    pub async fn wait_for_connections(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.connections() < count {
            assert!(tokio::time::Instant::now() < deadline, "connection never arrived");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for DeviceSimulator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Identifier of a local port nothing listens on
pub async fn refused_identifier() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("127.0.0.1:{}", port)
}

pub fn engine() -> IrconEngine {
    IrconEngine::new(test_config()).unwrap()
}

pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        connect_timeout_ms: 1000,
        send_timeout_ms: 1000,
        write_timeout_ms: 1000,
        close_timeout_ms: 1000,
        ..BridgeConfig::default()
    }
}

pub fn schema(columns: &[&str]) -> TableSchema {
    TableSchema::new(
        "ircon",
        columns.iter().map(|name| ColumnDef::text(*name)).collect(),
    )
}

/// The full controller table: every attribute plus one column the device ignores
pub fn controller_schema() -> TableSchema {
    TableSchema::new(
        "controller",
        vec![
            ColumnDef::text("mode"),
            ColumnDef::new("temperature", ColumnType::Integer),
            ColumnDef::text("power"),
            ColumnDef::new("angle", ColumnType::Integer),
            ColumnDef::text("label"),
        ],
    )
}
