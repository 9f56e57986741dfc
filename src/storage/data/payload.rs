//! Payload stores behind an offset index

use crate::config::StoreConfig;
use crate::error::Result;
use crate::storage::backing::{check_range, create_store, open_store, BackingKind, ByteStore, HeapStore};
use crate::storage::var::VarArray;
use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// A flat, appendable run of items addressed by position.
///
/// Implemented by raw bytes ([`ByteData`]) and packed vars ([`VarArray`]).
pub trait RecordPayload: Sized + fmt::Debug {
    type Item: Copy + Default + PartialEq + fmt::Debug;

    fn create_named(name: &str, config: &StoreConfig) -> Result<Self>;

    fn open_named(name: &str, config: &StoreConfig) -> Result<Self>;

    fn name(&self) -> &str;

    fn kind(&self) -> BackingKind;

    /// Length in items
    fn len(&self) -> usize;

    fn set_len(&mut self, len: usize) -> Result<()>;

    fn capacity(&self) -> usize;

    fn ensure_capacity(&mut self, items: usize) -> Result<()>;

    fn compact(&mut self) -> Result<()>;

    fn read(&self, start: usize, out: &mut [Self::Item]) -> Result<()>;

    fn write(&mut self, start: usize, items: &[Self::Item]) -> Result<()>;

    fn append(&mut self, items: &[Self::Item]) -> Result<()>;

    /// Append `count` items of `src` starting at `start`
    fn append_range(&mut self, src: &Self, start: usize, count: usize) -> Result<()>;

    /// Var width, or `None` for byte payloads
    fn width(&self) -> Option<usize>;

    fn hash_items(items: &[Self::Item]) -> u64;

    fn persist(&mut self) -> Result<()>;

    fn copy_as(&self, name: &str) -> Result<Self>;

    fn close(self) -> Result<()>;

    fn close_and_delete(self) -> Result<()>;
}

/// Raw byte payload
#[derive(Debug)]
pub struct ByteData {
    store: Box<dyn ByteStore>,
}

impl ByteData {
    pub fn wrap(store: Box<dyn ByteStore>) -> Self {
        Self { store }
    }

    pub fn in_memory(name: &str) -> Self {
        Self::wrap(Box::new(HeapStore::anonymous(name)))
    }

    pub fn as_slice(&self) -> &[u8] {
        self.store.as_slice()
    }

    pub(crate) fn store_mut(&mut self) -> &mut dyn ByteStore {
        self.store.as_mut()
    }
}

impl RecordPayload for ByteData {
    type Item = u8;

    fn create_named(name: &str, config: &StoreConfig) -> Result<Self> {
        Ok(Self::wrap(create_store(name, config)?))
    }

    fn open_named(name: &str, config: &StoreConfig) -> Result<Self> {
        Ok(Self::wrap(open_store(name, config)?))
    }

    fn name(&self) -> &str {
        self.store.name()
    }

    fn kind(&self) -> BackingKind {
        self.store.kind()
    }

    fn len(&self) -> usize {
        self.store.len()
    }

    fn set_len(&mut self, len: usize) -> Result<()> {
        self.store.set_len(len)
    }

    fn capacity(&self) -> usize {
        self.store.capacity()
    }

    fn ensure_capacity(&mut self, items: usize) -> Result<()> {
        self.store.ensure_capacity(items)
    }

    fn compact(&mut self) -> Result<()> {
        self.store.compact()
    }

    fn read(&self, start: usize, out: &mut [u8]) -> Result<()> {
        self.store.get_bytes(start, out)
    }

    fn write(&mut self, start: usize, items: &[u8]) -> Result<()> {
        self.store.set_bytes(start, items)
    }

    fn append(&mut self, items: &[u8]) -> Result<()> {
        self.store.append(items)
    }

    fn append_range(&mut self, src: &Self, start: usize, count: usize) -> Result<()> {
        check_range(src.name(), start, count, src.len())?;
        self.store.append(&src.store.as_slice()[start..start + count])
    }

    fn width(&self) -> Option<usize> {
        None
    }

    fn hash_items(items: &[u8]) -> u64 {
        xxh64(items, 0)
    }

    fn persist(&mut self) -> Result<()> {
        self.store.persist()
    }

    fn copy_as(&self, name: &str) -> Result<Self> {
        Ok(Self::wrap(self.store.copy_as(name)?))
    }

    fn close(self) -> Result<()> {
        self.store.close()
    }

    fn close_and_delete(self) -> Result<()> {
        self.store.close_and_delete()
    }
}

impl RecordPayload for VarArray {
    type Item = i64;

    fn create_named(name: &str, config: &StoreConfig) -> Result<Self> {
        VarArray::create(name, config)
    }

    fn open_named(name: &str, config: &StoreConfig) -> Result<Self> {
        VarArray::open(name, config)
    }

    fn name(&self) -> &str {
        VarArray::name(self)
    }

    fn kind(&self) -> BackingKind {
        VarArray::kind(self)
    }

    fn len(&self) -> usize {
        VarArray::len(self)
    }

    fn set_len(&mut self, len: usize) -> Result<()> {
        VarArray::set_len(self, len)
    }

    fn capacity(&self) -> usize {
        VarArray::capacity(self)
    }

    fn ensure_capacity(&mut self, items: usize) -> Result<()> {
        VarArray::ensure_capacity(self, items)
    }

    fn compact(&mut self) -> Result<()> {
        VarArray::compact(self)
    }

    fn read(&self, start: usize, out: &mut [i64]) -> Result<()> {
        self.get_many(start, out)
    }

    fn write(&mut self, start: usize, items: &[i64]) -> Result<()> {
        self.set_many(start, items)
    }

    fn append(&mut self, items: &[i64]) -> Result<()> {
        self.extend_from_slice(items)
    }

    fn append_range(&mut self, src: &Self, start: usize, count: usize) -> Result<()> {
        VarArray::append_range(self, src, start, count)
    }

    fn width(&self) -> Option<usize> {
        Some(VarArray::width(self))
    }

    fn hash_items(items: &[i64]) -> u64 {
        VarArray::hash_slice(items)
    }

    fn persist(&mut self) -> Result<()> {
        VarArray::persist(self)
    }

    fn copy_as(&self, name: &str) -> Result<Self> {
        VarArray::copy_as(self, name)
    }

    fn close(self) -> Result<()> {
        VarArray::close(self)
    }

    fn close_and_delete(self) -> Result<()> {
        VarArray::close_and_delete(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_payload_append_range() -> Result<()> {
        let mut a = ByteData::in_memory("a");
        let mut b = ByteData::in_memory("b");
        a.append(b"hello")?;
        b.append_range(&a, 1, 3)?;
        assert_eq!(b.as_slice(), b"ell");
        assert!(b.append_range(&a, 4, 2).is_err());
        Ok(())
    }

    #[test]
    fn test_var_payload_read_write() -> Result<()> {
        let mut vars = VarArray::in_memory("vars");
        RecordPayload::append(&mut vars, &[1, 2, 3])?;
        RecordPayload::write(&mut vars, 1, &[-400])?;
        let mut out = [0i64; 3];
        RecordPayload::read(&vars, 0, &mut out)?;
        assert_eq!(out, [1, -400, 3]);
        assert_eq!(RecordPayload::width(&vars), Some(2));
        Ok(())
    }
}
