//! Unified error handling for the ircon device bridge
//!
//! Every crate in the workspace reports failures through [`IrconError`], so the
//! storage-engine collaborator sees one taxonomy regardless of which layer
//! (address resolution, connection, capability check, scan) produced it.

use thiserror::Error;

/// Generic failure status code.
pub const HANDLER_ERR_GENERIC: i32 = 1;
/// Status code the collaborator treats as "capability not present".
pub const HANDLER_ERR_WRONG_COMMAND: i32 = 131;
/// Status code the collaborator treats as normal end of a scan.
pub const HANDLER_ERR_END_OF_FILE: i32 = 137;

// ============================================================================
// IrconError - Main error type
// ============================================================================

/// Main error type for the bridge
#[derive(Debug, Error)]
pub enum IrconError {
    // ======================================
    // Address Errors
    // ======================================
    #[error("Address parse failure: {identifier}: {reason}")]
    AddressParse { identifier: String, reason: String },

    // ======================================
    // Connection & Wire Errors
    // ======================================
    #[error("Connection failed: {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Share not connected: {identifier}")]
    NotConnected { identifier: String },

    /// `timed_out` is set when the line could not be queued in time while
    /// the writer was still alive
    #[error("Send failed: {endpoint}: {reason}")]
    SendFailure {
        endpoint: String,
        reason: String,
        timed_out: bool,
    },

    // ======================================
    // Capability & Scan Signals
    // ======================================
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    #[error("End of data")]
    EndOfData,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // ======================================
    // Validation Errors
    // ======================================
    #[error("Invalid value for column {column}: {reason}")]
    InvalidValue { column: String, reason: String },

    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type alias using IrconError
pub type Result<T> = std::result::Result<T, IrconError>;

/// Error category enum - used for classification and log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Address,
    Connection,
    Capability,
    Scan,
    Validation,
    Configuration,
    /// Handler driven out of lifecycle order
    Lifecycle,
}

impl IrconError {
    /// Create an address parse error
    pub fn address_parse(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AddressParse {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection error
    pub fn connection(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-connected error
    pub fn not_connected(identifier: impl Into<String>) -> Self {
        Self::NotConnected {
            identifier: identifier.into(),
        }
    }

    /// Create a send failure caused by a dead link
    pub fn send_failure(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SendFailure {
            endpoint: endpoint.into(),
            reason: reason.into(),
            timed_out: false,
        }
    }

    /// Create a send failure caused by a full queue
    pub fn send_timeout(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SendFailure {
            endpoint: endpoint.into(),
            reason: reason.into(),
            timed_out: true,
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Get error code (for logs and CLI output)
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AddressParse { .. } => "ADDRESS_PARSE_FAILURE",
            Self::Connection { .. } => "CONNECTION_ERROR",
            Self::NotConnected { .. } => "NOT_CONNECTED",
            Self::SendFailure { .. } => "SEND_FAILURE",
            Self::Unsupported { .. } => "UNSUPPORTED_OPERATION",
            Self::EndOfData => "END_OF_DATA",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::InvalidValue { .. } => "INVALID_VALUE",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AddressParse { .. } => ErrorCategory::Address,
            Self::Connection { .. } | Self::NotConnected { .. } | Self::SendFailure { .. } => {
                ErrorCategory::Connection
            },
            Self::Unsupported { .. } => ErrorCategory::Capability,
            Self::EndOfData => ErrorCategory::Scan,
            Self::InvalidState(_) => ErrorCategory::Lifecycle,
            Self::InvalidValue { .. } => ErrorCategory::Validation,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }

    /// Map to the storage-engine status code handed back to the collaborator
    pub fn handler_code(&self) -> i32 {
        match self {
            Self::EndOfData => HANDLER_ERR_END_OF_FILE,
            Self::Unsupported { .. } => HANDLER_ERR_WRONG_COMMAND,
            _ => HANDLER_ERR_GENERIC,
        }
    }

    /// Check if the caller may sensibly try again.
    ///
    /// The bridge itself never retries. Only a send that timed out while the
    /// writer is still alive can succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SendFailure { timed_out: true, .. })
    }

    /// Normal scan termination, not a failure
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, Self::EndOfData)
    }

    /// Get log level
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Lifecycle => Level::ERROR,
            ErrorCategory::Connection | ErrorCategory::Configuration => Level::WARN,
            ErrorCategory::Address | ErrorCategory::Validation => Level::INFO,
            ErrorCategory::Capability | ErrorCategory::Scan => Level::DEBUG,
        }
    }
}
