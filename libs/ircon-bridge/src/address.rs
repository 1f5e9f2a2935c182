//! Device address resolution
//!
//! A table identifier names the device it is bound to as `host[:port]`.

use std::fmt;

use errors::{IrconError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Port used when an identifier carries none, or one that does not parse
pub const DEFAULT_PORT: u16 = 7070;

/// Longest identifier accepted by default
pub const DEFAULT_MAX_IDENTIFIER_LEN: usize = 255;

/// Network endpoint of one device controller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub host: String,
    pub port: u16,
}

impl DeviceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parses table identifiers into device addresses
#[derive(Debug, Clone)]
pub struct AddressResolver {
    default_port: u16,
    max_len: usize,
}

impl Default for AddressResolver {
    fn default() -> Self {
        Self::new(DEFAULT_PORT, DEFAULT_MAX_IDENTIFIER_LEN)
    }
}

impl AddressResolver {
    pub fn new(default_port: u16, max_len: usize) -> Self {
        Self {
            default_port,
            max_len,
        }
    }

    pub fn default_port(&self) -> u16 {
        self.default_port
    }

    /// Split `identifier` at the first `:` into host and port.
    ///
    /// A missing, empty, unparsable or zero port falls back to the default
    /// port. Over-length identifiers and an empty host are rejected.
    pub fn parse(&self, identifier: &str) -> Result<DeviceAddress> {
        if identifier.len() > self.max_len {
            return Err(IrconError::address_parse(
                truncate_for_log(identifier),
                format!(
                    "identifier is {} bytes, maximum is {}",
                    identifier.len(),
                    self.max_len
                ),
            ));
        }

        let (host, port) = match identifier.split_once(':') {
            Some((host, port_str)) => (host, self.parse_port(identifier, port_str)),
            None => (identifier, self.default_port),
        };

        if host.is_empty() {
            return Err(IrconError::address_parse(identifier, "empty host"));
        }

        Ok(DeviceAddress::new(host, port))
    }

    fn parse_port(&self, identifier: &str, port_str: &str) -> u16 {
        match port_str.parse::<u16>() {
            Ok(0) | Err(_) => {
                debug!(
                    "Identifier {} has no usable port ({:?}), using default {}",
                    identifier, port_str, self.default_port
                );
                self.default_port
            },
            Ok(port) => port,
        }
    }
}

fn truncate_for_log(identifier: &str) -> String {
    identifier.chars().take(32).chain("...".chars()).collect()
}
