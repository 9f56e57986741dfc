//! Var record store: rows of packed integers

use super::OffsetIndexedStore;
use crate::error::Result;
use crate::storage::var::VarArray;

/// Rows of packed integers (posting lists, term id runs)
pub type VarRecordStore = OffsetIndexedStore<VarArray>;

impl OffsetIndexedStore<VarArray> {
    /// Current payload var width
    pub fn width(&self) -> usize {
        self.payload().width()
    }

    /// The `within`-th var of row `index`
    pub fn get_var(&self, index: usize, within: usize) -> Result<i64> {
        Ok(self.get_range(index, within, 1)?[0])
    }

    pub fn set_var(&mut self, index: usize, within: usize, value: i64) -> Result<()> {
        self.set_range(index, within, &[value])
    }

    /// Add `delta` to the `within`-th var of row `index`, returning the sum
    pub fn add_to(&mut self, index: usize, within: usize, delta: i64) -> Result<i64> {
        let current = self.get_var(index, within)?;
        if delta == 0 {
            return Ok(current);
        }
        let position = self.offset(index)? + within;
        self.payload_mut().add_to(position, delta)
    }
}
