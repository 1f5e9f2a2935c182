//! Capability set of a bridge table
//!
//! Every contract call is an [`Operation`]. A table declares the operations
//! it supports and rejects the rest with `Unsupported`.

use std::fmt;

use errors::{IrconError, Result};
use tracing::debug;

/// Calls the collaborator can make on a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Open,
    Close,
    Scan,
    WriteRow,
    UpdateRow,
    DeleteRow,
    DeleteAllRows,
    Truncate,
    IndexRead,
    IndexNext,
    IndexPrev,
    IndexFirst,
    IndexLast,
    ReadAtPosition,
    CreateTable,
    DeleteTable,
    RenameTable,
}

impl Operation {
    pub const ALL: [Operation; 17] = [
        Operation::Open,
        Operation::Close,
        Operation::Scan,
        Operation::WriteRow,
        Operation::UpdateRow,
        Operation::DeleteRow,
        Operation::DeleteAllRows,
        Operation::Truncate,
        Operation::IndexRead,
        Operation::IndexNext,
        Operation::IndexPrev,
        Operation::IndexFirst,
        Operation::IndexLast,
        Operation::ReadAtPosition,
        Operation::CreateTable,
        Operation::DeleteTable,
        Operation::RenameTable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Scan => "scan",
            Self::WriteRow => "write_row",
            Self::UpdateRow => "update_row",
            Self::DeleteRow => "delete_row",
            Self::DeleteAllRows => "delete_all_rows",
            Self::Truncate => "truncate",
            Self::IndexRead => "index_read",
            Self::IndexNext => "index_next",
            Self::IndexPrev => "index_prev",
            Self::IndexFirst => "index_first",
            Self::IndexLast => "index_last",
            Self::ReadAtPosition => "read_at_position",
            Self::CreateTable => "create_table",
            Self::DeleteTable => "delete_table",
            Self::RenameTable => "rename_table",
        }
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of supported operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    mask: u32,
}

impl Capabilities {
    pub const fn none() -> Self {
        Self { mask: 0 }
    }

    /// What a device bridge table can do: lifecycle, scan, row writes, and
    /// create/drop as no-ops. `read_only` drops the three row writes.
    pub fn device_bridge(read_only: bool) -> Self {
        let mut caps = Self::none()
            .with(Operation::Open)
            .with(Operation::Close)
            .with(Operation::Scan)
            .with(Operation::CreateTable)
            .with(Operation::DeleteTable);
        if !read_only {
            caps = caps
                .with(Operation::WriteRow)
                .with(Operation::UpdateRow)
                .with(Operation::DeleteRow);
        }
        caps
    }

    pub fn with(mut self, op: Operation) -> Self {
        self.mask |= op.bit();
        self
    }

    pub fn without(mut self, op: Operation) -> Self {
        self.mask &= !op.bit();
        self
    }

    pub fn supports(&self, op: Operation) -> bool {
        self.mask & op.bit() != 0
    }

    /// `Ok` when `op` is supported, `Unsupported` otherwise
    pub fn require(&self, op: Operation) -> Result<()> {
        if self.supports(op) {
            Ok(())
        } else {
            debug!("Rejecting unsupported operation {}", op);
            Err(IrconError::unsupported(op.as_str()))
        }
    }

    pub fn supported(&self) -> impl Iterator<Item = Operation> + '_ {
        Operation::ALL.into_iter().filter(|op| self.supports(*op))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_device_bridge_capabilities() {
        let caps = Capabilities::device_bridge(false);
        for op in [
            Operation::Open,
            Operation::Close,
            Operation::Scan,
            Operation::WriteRow,
            Operation::UpdateRow,
            Operation::DeleteRow,
            Operation::CreateTable,
            Operation::DeleteTable,
        ] {
            assert!(caps.supports(op), "{op} should be supported");
        }
        for op in [
            Operation::IndexRead,
            Operation::IndexNext,
            Operation::IndexPrev,
            Operation::IndexFirst,
            Operation::IndexLast,
            Operation::ReadAtPosition,
            Operation::RenameTable,
            Operation::Truncate,
            Operation::DeleteAllRows,
        ] {
            let err = caps.require(op).unwrap_err();
            assert!(matches!(err, IrconError::Unsupported { ref operation } if operation == op.as_str()));
        }
    }

    #[test]
    fn test_read_only_drops_row_writes() {
        let caps = Capabilities::device_bridge(true);
        assert!(caps.supports(Operation::Scan));
        assert!(!caps.supports(Operation::WriteRow));
        assert!(!caps.supports(Operation::UpdateRow));
        assert!(!caps.supports(Operation::DeleteRow));
    }

    #[test]
    fn test_with_without() {
        let caps = Capabilities::none().with(Operation::Scan);
        assert_eq!(caps.supported().collect::<Vec<_>>(), vec![Operation::Scan]);
        assert_eq!(caps.without(Operation::Scan), Capabilities::none());
    }
}
