//! ircon device bridge
//!
//! Exposes a stateful infrared controller as a single-row table. Writes are
//! encoded into `name:value` line protocol and pushed over a persistent TCP
//! link; reads project a locally cached copy of the last written attributes.
//!
//! # Key Components
//!
//! - **AddressResolver**: table identifier to `host:port`
//! - **SharedDeviceState**: per-identifier connection plus attribute cache
//! - **ShareRegistry**: identifier to shared state map
//! - **BridgeTable**: the handler facade the engine drives
//! - **IrconEngine**: owns configuration and registry, creates handlers

pub mod address;
pub mod capability;
pub mod codec;
pub mod config;
pub mod connection;
pub mod engine;
pub mod registry;
pub mod scan;
pub mod schema;
pub mod share;
pub mod stats;
pub mod table;

// Re-exports
pub use errors::{IrconError, Result};

pub use address::{AddressResolver, DeviceAddress, DEFAULT_PORT};
pub use capability::{Capabilities, Operation};
pub use codec::{Attribute, AttributeCache, AttributeCodec, RESET_COMMAND, UNKNOWN};
pub use config::{BridgeConfig, ClosePolicy, LoggingConfig};
pub use connection::{ConnectionSettings, DeviceConnection, LinkState};
pub use engine::IrconEngine;
pub use registry::ShareRegistry;
pub use scan::{ScanSession, ScanState};
pub use schema::{ColumnDef, ColumnType, Row, TableSchema, Value};
pub use share::SharedDeviceState;
pub use stats::{ConnectionStats, LinkHealth};
pub use table::{BridgeTable, TableInfo};
