//! Full-table scan over the attribute cache
//!
//! The device has no readable state, so a scan yields exactly one row: the
//! cache projected onto the schema. A second fetch reports end of data.

use errors::{IrconError, Result};

use crate::codec::{AttributeCache, AttributeCodec};
use crate::schema::{Row, TableSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Init,
    Exhausted,
}

#[derive(Debug)]
pub struct ScanSession {
    state: ScanState,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanSession {
    pub fn new() -> Self {
        Self {
            state: ScanState::Init,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Fetch the next row
    pub fn next(&mut self, schema: &TableSchema, cache: &AttributeCache) -> Result<Row> {
        match self.state {
            ScanState::Init => {
                self.state = ScanState::Exhausted;
                Ok(AttributeCodec::decode_row(schema, cache))
            },
            ScanState::Exhausted => Err(IrconError::EndOfData),
        }
    }
}
