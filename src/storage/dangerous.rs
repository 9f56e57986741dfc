//! Unchecked access to the arrays under each store
//!
//! These traits hand out the raw pieces so tools can repair or inspect
//! resources in place. Nothing here keeps the cross-array invariants; run
//! `sanity_check` afterwards.

use crate::error::Result;
use crate::storage::backing::ByteStore;
use crate::storage::chain::{ChainAllocator, LinkedRecordStore};
use crate::storage::data::{ByteData, OffsetIndexedStore, RecordPayload};
use crate::storage::var::VarArray;

/// Raw access to a var array
pub trait DangerousVarArray {
    /// Backing byte store
    fn raw_store(&mut self) -> &mut dyn ByteStore;

    /// Force the var width. Shrinking drops high bytes silently.
    fn set_width(&mut self, width: usize) -> Result<()>;
}

impl DangerousVarArray for VarArray {
    fn raw_store(&mut self) -> &mut dyn ByteStore {
        self.store_mut()
    }

    fn set_width(&mut self, width: usize) -> Result<()> {
        self.change_width(width)
    }
}

/// Raw access to a byte payload
pub trait DangerousByteData {
    fn raw_store(&mut self) -> &mut dyn ByteStore;
}

impl DangerousByteData for ByteData {
    fn raw_store(&mut self) -> &mut dyn ByteStore {
        self.store_mut()
    }
}

/// Raw access to a record store's payload and offsets
pub trait DangerousRecordStore<P: RecordPayload> {
    fn raw_payload(&mut self) -> &mut P;

    fn raw_offsets(&mut self) -> &mut VarArray;
}

impl<P: RecordPayload> DangerousRecordStore<P> for OffsetIndexedStore<P> {
    fn raw_payload(&mut self) -> &mut P {
        self.payload_mut()
    }

    fn raw_offsets(&mut self) -> &mut VarArray {
        self.offsets_mut()
    }
}

/// Raw access to a chain pool's link arrays
pub trait DangerousChainAllocator {
    fn raw_next(&mut self) -> &mut VarArray;

    fn raw_last(&mut self) -> &mut VarArray;

    fn raw_counts(&mut self) -> &mut VarArray;
}

impl DangerousChainAllocator for ChainAllocator {
    fn raw_next(&mut self) -> &mut VarArray {
        self.next_mut()
    }

    fn raw_last(&mut self) -> &mut VarArray {
        self.last_mut()
    }

    fn raw_counts(&mut self) -> &mut VarArray {
        self.counts_mut()
    }
}

/// Raw access to a linked store's pool and values
pub trait DangerousLinkedStore {
    fn raw_chains(&mut self) -> &mut ChainAllocator;

    fn raw_values(&mut self) -> &mut VarArray;
}

impl DangerousLinkedStore for LinkedRecordStore {
    fn raw_chains(&mut self) -> &mut ChainAllocator {
        self.chains_mut()
    }

    fn raw_values(&mut self) -> &mut VarArray {
        self.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::data::VarRecordStore;

    #[test]
    fn test_set_width_truncates() -> Result<()> {
        let mut vars = VarArray::in_memory("vars");
        vars.extend_from_slice(&[1, 300, -2])?;
        assert_eq!(vars.width(), 2);
        vars.set_width(1)?;
        assert_eq!(vars.width(), 1);
        // 300 = 0x012c keeps only its low byte
        assert_eq!(vars.to_vec(), vec![1, 0x2c, -2]);
        vars.set_width(4)?;
        assert_eq!(vars.to_vec(), vec![1, 0x2c, -2]);
        assert!(vars.set_width(9).is_err());
        Ok(())
    }

    #[test]
    fn test_raw_store_bypasses_width() -> Result<()> {
        let mut vars = VarArray::in_memory("vars");
        vars.push(5)?;
        vars.raw_store().set_byte(0, 7)?;
        assert_eq!(vars.get(0)?, 7);
        Ok(())
    }

    #[test]
    fn test_broken_offsets_fail_sanity() -> Result<()> {
        let mut rows = VarRecordStore::in_memory("rows")?;
        rows.push(&[1, 2])?;
        rows.raw_offsets().set(1, 5)?;
        assert!(matches!(rows.sanity_check(), Err(Error::Corruption(_))));
        Ok(())
    }

    #[test]
    fn test_orphan_value_fails_sanity() -> Result<()> {
        let mut lists = LinkedRecordStore::in_memory("lists")?;
        lists.append(0, 1)?;
        lists.raw_values().push(9)?;
        assert!(matches!(lists.sanity_check(), Err(Error::Corruption(_))));
        lists.raw_values().set_len(1)?;
        lists.raw_chains().raw_counts().set(0, 1)?;
        assert!(lists.sanity_check().is_err());
        Ok(())
    }
}
