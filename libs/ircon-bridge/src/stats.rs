//! Connection statistics, exposed like the engine's status variables

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Link state as seen by the statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkHealth {
    #[default]
    Disconnected,
    Connected,
    Error,
}

/// Counters for one device connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub connection_attempts: u64,
    pub successful_connections: u64,
    pub failed_connections: u64,
    pub disconnections: u64,
    pub lines_sent: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
    pub last_connection: Option<SystemTime>,
    pub health: LinkHealth,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection_attempt(&mut self) {
        self.connection_attempts += 1;
    }

    pub fn record_successful_connection(&mut self) {
        self.successful_connections += 1;
        self.last_connection = Some(SystemTime::now());
        self.health = LinkHealth::Connected;
    }

    pub fn record_failed_connection(&mut self) {
        self.failed_connections += 1;
        self.health = LinkHealth::Error;
    }

    pub fn record_disconnection(&mut self) {
        self.disconnections += 1;
        self.health = LinkHealth::Disconnected;
    }

    pub fn record_line_sent(&mut self, bytes: usize) {
        self.lines_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_send_failure(&mut self) {
        self.send_failures += 1;
        self.health = LinkHealth::Error;
    }
}
