//! ircon basic library
//!
//! Provides runtime plumbing shared by the bridge and its tools:
//! - logging bootstrap (console + daily rolling file)
//! - configuration source helpers (explicit > environment > default)
//! - shutdown signal handling

pub mod config_loader;
pub mod logging;
pub mod shutdown;

pub use config_loader::{get_config_value, get_optional_string};
pub use shutdown::{wait_for_shutdown, ShutdownSignal};
