//! Table handler facade
//!
//! One `BridgeTable` per accessor. It binds a schema to a shared device state
//! and maps the engine's lifecycle calls (open, scan bracket, row writes,
//! close) onto it. Everything the device cannot do is rejected through the
//! capability set.

use std::sync::Arc;

use errors::{IrconError, Result};
use serde::Serialize;
use tracing::{debug, error, info, warn, Level};

use crate::capability::{Capabilities, Operation};
use crate::config::ClosePolicy;
use crate::registry::ShareRegistry;
use crate::scan::ScanSession;
use crate::schema::{Row, TableSchema};
use crate::share::SharedDeviceState;
use crate::stats::ConnectionStats;

/// Row-count hint reported to the optimizer
pub const ESTIMATED_ROW_COUNT: u64 = 2;

/// Range-scan hint; kept low so the optimizer prefers this table
pub const ESTIMATED_RANGE_ROWS: u64 = 10;

/// Table statistics reported through `info`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub records: u64,
}

#[derive(Debug)]
pub struct BridgeTable {
    schema: Arc<TableSchema>,
    registry: Arc<ShareRegistry>,
    close_policy: ClosePolicy,
    capabilities: Capabilities,
    share: Option<Arc<SharedDeviceState>>,
    scan: Option<ScanSession>,
}

impl BridgeTable {
    pub fn new(
        schema: Arc<TableSchema>,
        registry: Arc<ShareRegistry>,
        close_policy: ClosePolicy,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            schema,
            registry,
            close_policy,
            capabilities,
            share: None,
            scan: None,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn is_open(&self) -> bool {
        self.share.is_some()
    }

    /// Identifier of the share this handler is bound to
    pub fn identifier(&self) -> Option<&str> {
        self.share.as_deref().map(SharedDeviceState::identifier)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Bind to the share for `identifier`, connecting it if needed.
    ///
    /// Re-opening the identifier this handler already holds is a no-op.
    pub async fn open(&mut self, identifier: &str) -> Result<()> {
        self.capabilities.require(Operation::Open)?;

        if let Some(current) = &self.share {
            if current.identifier() == identifier {
                return Ok(());
            }
            return Err(IrconError::InvalidState(format!(
                "handler already open on {}",
                current.identifier()
            )));
        }

        let share = self
            .registry
            .get_or_create(identifier)
            .inspect_err(|e| log_failure(&self.schema.name, Operation::Open, e))?;
        share
            .attach()
            .await
            .inspect_err(|e| log_failure(&self.schema.name, Operation::Open, e))?;
        info!("Opened table {} on {}", self.schema.name, share.address());
        self.share = Some(share);
        Ok(())
    }

    /// Release this handler's hold on its share. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        self.capabilities.require(Operation::Close)?;
        self.scan = None;

        if let Some(share) = self.share.take() {
            let closed = share.detach(self.close_policy).await;
            debug!(
                "Closed table {} on {} (link torn down: {})",
                self.schema.name,
                share.identifier(),
                closed
            );
        }
        Ok(())
    }

    // ========================================================================
    // Scan bracket
    // ========================================================================

    pub fn scan_begin(&mut self) -> Result<()> {
        self.capabilities.require(Operation::Scan)?;
        self.share()?;
        self.scan = Some(ScanSession::new());
        Ok(())
    }

    /// Next row of the current bracket; `EndOfData` after the first
    pub async fn scan_next(&mut self) -> Result<Row> {
        let share = Arc::clone(self.share()?);
        let session = self
            .scan
            .as_mut()
            .ok_or_else(|| IrconError::InvalidState("scan_next outside a scan".to_string()))?;

        let cache = share.snapshot().await;
        session
            .next(&self.schema, &cache)
            .inspect_err(|e| log_failure(&self.schema.name, Operation::Scan, e))
    }

    pub fn scan_end(&mut self) {
        self.scan = None;
    }

    // ========================================================================
    // Row writes
    // ========================================================================

    pub async fn write_row(&self, row: &Row) -> Result<()> {
        self.capabilities.require(Operation::WriteRow)?;
        self.share()?
            .write_row(&self.schema, row)
            .await
            .inspect_err(|e| log_failure(&self.schema.name, Operation::WriteRow, e))
    }

    /// Same wire behavior as `write_row`: the device has no notion of
    /// insert versus update.
    pub async fn update_row(&self, row: &Row) -> Result<()> {
        self.capabilities.require(Operation::UpdateRow)?;
        self.share()?
            .write_row(&self.schema, row)
            .await
            .inspect_err(|e| log_failure(&self.schema.name, Operation::UpdateRow, e))
    }

    pub async fn delete_row(&self) -> Result<()> {
        self.capabilities.require(Operation::DeleteRow)?;
        self.share()?
            .reset()
            .await
            .inspect_err(|e| log_failure(&self.schema.name, Operation::DeleteRow, e))
    }

    pub fn delete_all_rows(&self) -> Result<()> {
        self.reject(Operation::DeleteAllRows)
    }

    pub fn truncate(&self) -> Result<()> {
        self.reject(Operation::Truncate)
    }

    // ========================================================================
    // Index access
    // ========================================================================

    pub fn index_read(&self, _key: &[u8]) -> Result<Row> {
        self.reject(Operation::IndexRead)
    }

    pub fn index_next(&self) -> Result<Row> {
        self.reject(Operation::IndexNext)
    }

    pub fn index_prev(&self) -> Result<Row> {
        self.reject(Operation::IndexPrev)
    }

    pub fn index_first(&self) -> Result<Row> {
        self.reject(Operation::IndexFirst)
    }

    pub fn index_last(&self) -> Result<Row> {
        self.reject(Operation::IndexLast)
    }

    /// Row positions carry no information for a single synthetic row
    pub fn position(&self, _row: &Row) {}

    pub fn read_at_position(&self, _position: &[u8]) -> Result<Row> {
        self.reject(Operation::ReadAtPosition)
    }

    // ========================================================================
    // DDL
    // ========================================================================

    /// Nothing to create: the table lives on the device
    pub fn create_table(&self, name: &str) -> Result<()> {
        self.capabilities.require(Operation::CreateTable)?;
        debug!("create_table {} (no-op)", name);
        Ok(())
    }

    pub fn delete_table(&self, name: &str) -> Result<()> {
        self.capabilities.require(Operation::DeleteTable)?;
        debug!("delete_table {} (no-op)", name);
        Ok(())
    }

    pub fn rename_table(&self, _from: &str, _to: &str) -> Result<()> {
        self.reject(Operation::RenameTable)
    }

    // ========================================================================
    // Optimizer hints and status
    // ========================================================================

    pub fn estimate_row_count(&self) -> u64 {
        ESTIMATED_ROW_COUNT
    }

    pub fn estimate_range_rows(&self) -> u64 {
        ESTIMATED_RANGE_ROWS
    }

    pub fn info(&self) -> TableInfo {
        TableInfo {
            records: ESTIMATED_ROW_COUNT,
        }
    }

    /// Connection statistics of the bound share, if open
    pub async fn stats(&self) -> Option<ConnectionStats> {
        match &self.share {
            Some(share) => Some(share.stats().await),
            None => None,
        }
    }

    /// The engine keeps no files of its own
    pub fn file_extensions(&self) -> &'static [&'static str] {
        &[]
    }

    fn share(&self) -> Result<&Arc<SharedDeviceState>> {
        self.share
            .as_ref()
            .ok_or_else(|| IrconError::InvalidState(format!("table {} is not open", self.schema.name)))
    }

    /// Reject `op`; a capability set that claims it still gets `Unsupported`
    /// since the bridge has nothing behind it.
    fn reject<T>(&self, op: Operation) -> Result<T> {
        self.capabilities.require(op)?;
        Err(IrconError::unsupported(op.as_str()))
    }
}

/// Log a failed call at the level its error category calls for
fn log_failure(table: &str, op: Operation, err: &IrconError) {
    let level = err.log_level();
    if level == Level::ERROR {
        error!("{} on {} failed [{}]: {}", op, table, err.error_code(), err);
    } else if level == Level::WARN {
        warn!("{} on {} failed [{}]: {}", op, table, err.error_code(), err);
    } else if level == Level::INFO {
        info!("{} on {} failed [{}]: {}", op, table, err.error_code(), err);
    } else {
        debug!("{} on {} ended [{}]: {}", op, table, err.error_code(), err);
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::address::AddressResolver;
    use crate::connection::ConnectionSettings;
    use crate::schema::ColumnDef;
    use tracing_test::traced_test;

    fn table(read_only: bool) -> BridgeTable {
        let registry = Arc::new(ShareRegistry::new(
            AddressResolver::default(),
            ConnectionSettings::default(),
        ));
        let schema = Arc::new(TableSchema::new("dev", vec![ColumnDef::text("mode")]));
        BridgeTable::new(
            schema,
            registry,
            ClosePolicy::default(),
            Capabilities::device_bridge(read_only),
        )
    }

    #[test]
    fn test_hints() {
        let table = table(false);
        assert_eq!(table.estimate_row_count(), 2);
        assert_eq!(table.estimate_range_rows(), 10);
        assert_eq!(table.info(), TableInfo { records: 2 });
        assert!(table.file_extensions().is_empty());
    }

    #[test]
    fn test_unsupported_surface() {
        let table = table(false);
        let checks: Vec<Result<Row>> = vec![
            table.index_read(b"any key"),
            table.index_next(),
            table.index_prev(),
            table.index_first(),
            table.index_last(),
            table.read_at_position(&[0; 8]),
        ];
        for result in checks {
            assert!(matches!(result, Err(IrconError::Unsupported { .. })));
        }
        assert!(matches!(table.rename_table("a", "b"), Err(IrconError::Unsupported { .. })));
        assert!(matches!(table.truncate(), Err(IrconError::Unsupported { .. })));
        assert!(matches!(table.delete_all_rows(), Err(IrconError::Unsupported { .. })));
    }

    #[test]
    fn test_ddl_noops() {
        let table = table(false);
        assert!(table.create_table("dev").is_ok());
        assert!(table.delete_table("dev").is_ok());
    }

    #[tokio::test]
    async fn test_operations_require_open() {
        let mut table = table(false);
        let row = Row::new(vec!["on".into()]);

        assert!(matches!(table.write_row(&row).await, Err(IrconError::InvalidState(_))));
        assert!(matches!(table.scan_begin(), Err(IrconError::InvalidState(_))));
        assert!(table.stats().await.is_none());
        // Closing an unopened handler is fine
        assert!(table.close().await.is_ok());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_open_failure_logged_with_error_code() {
        let mut table = table(false);
        let err = table.open(":7070").await.unwrap_err();
        assert!(matches!(err, IrconError::AddressParse { .. }));
        assert!(logs_contain("[ADDRESS_PARSE_FAILURE]"));
        assert!(!table.is_open());
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let table = table(true);
        let row = Row::new(vec!["on".into()]);

        assert!(matches!(table.write_row(&row).await, Err(IrconError::Unsupported { .. })));
        assert!(matches!(table.update_row(&row).await, Err(IrconError::Unsupported { .. })));
        assert!(matches!(table.delete_row().await, Err(IrconError::Unsupported { .. })));
    }
}
