//! Bridge configuration
//!
//! Loaded with figment: built-in defaults, then an optional YAML/TOML/JSON
//! file, then `IRCON_`-prefixed environment variables (`__` separates nested
//! keys, e.g. `IRCON_LOGGING__LEVEL=debug`).

use std::path::Path;
use std::time::Duration;

use errors::{IrconError, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::{AddressResolver, DEFAULT_MAX_IDENTIFIER_LEN, DEFAULT_PORT};

/// What `close()` does to a share other accessors still hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosePolicy {
    /// Reference counted: only the last accessor's close tears the link down
    #[default]
    LastCloser,
    /// Every close tears the link down, even under live accessors
    Eager,
}

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_port")]
    pub default_port: u16,

    #[serde(default = "default_max_identifier_len")]
    pub max_identifier_len: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,

    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    #[serde(default = "default_close_timeout")]
    pub close_timeout_ms: u64,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub close_policy: ClosePolicy,

    #[serde(default)]
    pub read_only: bool,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging section, consumed by the tools when they bootstrap `common::logging`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default)]
    pub file: bool,

    #[serde(default)]
    pub json: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_identifier_len() -> usize {
    DEFAULT_MAX_IDENTIFIER_LEN
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_send_timeout() -> u64 {
    2000
}

fn default_write_timeout() -> u64 {
    5000
}

fn default_close_timeout() -> u64 {
    2000
}

fn default_queue_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    /// Parsed `level`; a misspelled level is a configuration error
    pub fn level(&self) -> Result<tracing::Level> {
        self.level.parse().map_err(|_| {
            IrconError::config(format!(
                "Invalid logging.level {:?}, expected trace, debug, info, warn or error",
                self.level
            ))
        })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
            file: false,
            json: false,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_port: default_port(),
            max_identifier_len: default_max_identifier_len(),
            connect_timeout_ms: default_connect_timeout(),
            send_timeout_ms: default_send_timeout(),
            write_timeout_ms: default_write_timeout(),
            close_timeout_ms: default_close_timeout(),
            queue_capacity: default_queue_capacity(),
            close_policy: ClosePolicy::default(),
            read_only: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load from defaults, an optional file, and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(BridgeConfig::default()));

        if let Some(path) = path {
            // figment skips missing files silently
            if !path.is_file() {
                return Err(IrconError::config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let extension = path
                .extension()
                .and_then(|s| s.to_str())
                .ok_or_else(|| IrconError::config("Config file has no extension"))?;

            figment = match extension {
                "json" => figment.merge(Json::file(path)),
                "toml" => figment.merge(Toml::file(path)),
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                _ => {
                    return Err(IrconError::config(format!(
                        "Unsupported config format: {}",
                        extension
                    )))
                },
            };
            debug!("Loading bridge config from {}", path.display());
        }

        figment = figment.merge(Env::prefixed("IRCON_").split("__"));

        let config: BridgeConfig = figment
            .extract()
            .map_err(|e| IrconError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_port == 0 {
            return Err(IrconError::config("default_port cannot be zero"));
        }
        if self.max_identifier_len == 0 {
            return Err(IrconError::config("max_identifier_len cannot be zero"));
        }
        if [
            self.connect_timeout_ms,
            self.send_timeout_ms,
            self.write_timeout_ms,
            self.close_timeout_ms,
        ]
        .contains(&0)
        {
            return Err(IrconError::config("Timeouts must be greater than zero"));
        }
        if self.queue_capacity == 0 {
            return Err(IrconError::config("queue_capacity cannot be zero"));
        }
        self.logging.level()?;
        Ok(())
    }

    pub fn resolver(&self) -> AddressResolver {
        AddressResolver::new(self.default_port, self.max_identifier_len)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}
