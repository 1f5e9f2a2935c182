//! Per-table shared device state
//!
//! One instance per table identifier. It owns the connection, the attribute
//! cache and the accessor count, all behind one lock: cache reads and writes
//! and every send happen while holding it.

use bytes::Bytes;
use errors::{IrconError, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::address::DeviceAddress;
use crate::codec::{AttributeCache, AttributeCodec, RESET_COMMAND};
use crate::config::ClosePolicy;
use crate::connection::{ConnectionSettings, DeviceConnection, LinkState};
use crate::schema::{Row, TableSchema};
use crate::stats::ConnectionStats;

#[derive(Debug)]
struct ShareInner {
    connection: DeviceConnection,
    cache: AttributeCache,
    accessors: usize,
}

/// State shared by every accessor of one logical table
#[derive(Debug)]
pub struct SharedDeviceState {
    identifier: String,
    address: DeviceAddress,
    inner: Mutex<ShareInner>,
}

impl SharedDeviceState {
    pub fn new(
        identifier: impl Into<String>,
        address: DeviceAddress,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            inner: Mutex::new(ShareInner {
                connection: DeviceConnection::new(address.clone(), settings),
                cache: AttributeCache::new(),
                accessors: 0,
            }),
            address,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Register an accessor, connecting first if the link is not up.
    ///
    /// A fresh connection starts from an all-UNKNOWN cache. An already
    /// connected share is left alone: no reconnect, no cache reset. A link
    /// whose writer died is failed like a refused connect.
    pub async fn attach(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if inner.connection.refresh_state() != LinkState::Connected {
            inner.connection.connect().await?;
            inner.cache.reset();
            debug!("Share {} connected, cache reset", self.identifier);
        }

        inner.accessors += 1;
        debug!(
            "Share {} attached, {} accessor(s)",
            self.identifier, inner.accessors
        );
        Ok(())
    }

    /// Unregister an accessor and close the link according to `policy`.
    ///
    /// Returns `true` when the link was torn down.
    pub async fn detach(&self, policy: ClosePolicy) -> bool {
        let mut inner = self.inner.lock().await;
        inner.accessors = inner.accessors.saturating_sub(1);

        if inner.accessors > 0 {
            match policy {
                ClosePolicy::LastCloser => {
                    debug!(
                        "Share {} detached, {} accessor(s) remain",
                        self.identifier, inner.accessors
                    );
                    return false;
                },
                ClosePolicy::Eager => warn!(
                    "Eager close of share {} while {} other accessor(s) still hold it",
                    self.identifier, inner.accessors
                ),
            }
        }

        inner.connection.close().await;
        info!("Share {} disconnected", self.identifier);
        true
    }

    /// Encode `row` against the cache and send the resulting line.
    ///
    /// The cache only takes the new values once the line is queued, so a
    /// failed send leaves it as it was.
    pub async fn write_row(&self, schema: &TableSchema, row: &Row) -> Result<()> {
        AttributeCodec::validate_row(schema, row)?;

        let mut guard = self.inner.lock().await;
        self.ensure_connected(&mut guard)?;

        let mut next = guard.cache.clone();
        let line = AttributeCodec::encode_row(schema, row, &mut next);
        debug!(
            "Share {} write: {}",
            self.identifier,
            String::from_utf8_lossy(&line).trim_end()
        );
        guard.connection.send(line).await?;
        guard.cache = next;
        Ok(())
    }

    /// Reset every attribute to UNKNOWN and send the literal reset command.
    ///
    /// Unlike a scan, this needs a live link: on a disconnected share it
    /// returns `NotConnected` and the cache keeps its values.
    pub async fn reset(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        self.ensure_connected(&mut guard)?;

        guard
            .connection
            .send(Bytes::from_static(RESET_COMMAND.as_bytes()))
            .await?;
        guard.cache.reset();
        debug!("Share {} reset", self.identifier);
        Ok(())
    }

    /// Project the current cache onto `schema`
    pub async fn read_row(&self, schema: &TableSchema) -> Row {
        let inner = self.inner.lock().await;
        AttributeCodec::decode_row(schema, &inner.cache)
    }

    pub async fn snapshot(&self) -> AttributeCache {
        self.inner.lock().await.cache.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.connection.refresh_state() == LinkState::Connected
    }

    pub async fn link_state(&self) -> LinkState {
        self.inner.lock().await.connection.refresh_state()
    }

    pub async fn accessors(&self) -> usize {
        self.inner.lock().await.accessors
    }

    pub async fn stats(&self) -> ConnectionStats {
        self.inner.lock().await.connection.stats()
    }

    fn ensure_connected(&self, inner: &mut ShareInner) -> Result<()> {
        if inner.connection.refresh_state() == LinkState::Connected {
            Ok(())
        } else {
            Err(IrconError::not_connected(&self.identifier))
        }
    }
}
