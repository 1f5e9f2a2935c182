//! Engine entry point
//!
//! Owns the configuration and the share registry, hands out table handlers
//! and ends share lifetimes when the surrounding engine drops a table share.

use std::path::Path;
use std::sync::Arc;

use errors::Result;
use tracing::{info, warn};

use crate::capability::Capabilities;
use crate::config::BridgeConfig;
use crate::connection::ConnectionSettings;
use crate::registry::ShareRegistry;
use crate::schema::TableSchema;
use crate::table::BridgeTable;

pub const ENGINE_NAME: &str = "IRCON";

#[derive(Debug)]
pub struct IrconEngine {
    config: BridgeConfig,
    registry: Arc<ShareRegistry>,
}

impl IrconEngine {
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let registry = ShareRegistry::new(config.resolver(), ConnectionSettings::from(&config));
        info!(
            "{} engine ready (close policy {:?}, read_only {})",
            ENGINE_NAME, config.close_policy, config.read_only
        );
        Ok(Self {
            config,
            registry: Arc::new(registry),
        })
    }

    /// Load configuration from `path` (plus environment) and build the engine
    pub fn from_config_file(path: Option<&Path>) -> Result<Self> {
        Self::new(BridgeConfig::load(path)?)
    }

    pub fn engine_name(&self) -> &'static str {
        ENGINE_NAME
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ShareRegistry> {
        &self.registry
    }

    /// New handler for a table with the given schema
    pub fn create_handler(&self, schema: TableSchema) -> BridgeTable {
        BridgeTable::new(
            Arc::new(schema),
            Arc::clone(&self.registry),
            self.config.close_policy,
            Capabilities::device_bridge(self.config.read_only),
        )
    }

    /// End the share lifetime for `identifier`; the next open starts fresh.
    ///
    /// Returns `true` if a share was registered.
    pub async fn drop_share(&self, identifier: &str) -> bool {
        match self.registry.release(identifier) {
            Some(share) => {
                if share.is_connected().await {
                    warn!(
                        "Dropping share {} while {} accessor(s) still hold it",
                        identifier,
                        share.accessors().await
                    );
                }
                true
            },
            None => false,
        }
    }
}
