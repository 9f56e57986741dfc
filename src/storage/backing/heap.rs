//! Heap-backed byte store

use super::compression::{compress, decompress, CompressionAlgorithm};
use super::header::{ResourceHeader, HEADER_LEN, PARAM_SLOTS};
use super::{check_param_slot, grown_capacity, resource_path, BackingKind, ByteStore};
use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Byte store held in a `Vec<u8>`
///
/// Persisting writes `<directory>/<name>.vstore` through a temp file and a
/// rename, optionally zstd-compressing the payload.
#[derive(Debug)]
pub struct HeapStore {
    name: String,
    directory: Option<PathBuf>,
    compression: CompressionAlgorithm,
    data: Vec<u8>,
    capacity: usize,
    params: [i64; PARAM_SLOTS],
}

impl HeapStore {
    pub fn new(
        name: &str,
        directory: Option<PathBuf>,
        compression: CompressionAlgorithm,
        capacity: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            directory,
            compression,
            data: Vec::with_capacity(capacity),
            capacity,
            params: [0; PARAM_SLOTS],
        }
    }

    /// In-memory store with no resource behind it
    pub fn anonymous(name: &str) -> Self {
        Self::new(name, None, CompressionAlgorithm::None, 0)
    }

    /// Load `<directory>/<name>.vstore` into memory
    pub fn load(name: &str, directory: &Path, compression: CompressionAlgorithm) -> Result<Self> {
        let path = resource_path(directory, name);
        let mut file = File::open(&path)
            .map_err(|e| Error::Storage(format!("Failed to open {}: {}", path.display(), e)))?;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)
            .map_err(|e| Error::Storage(format!("Failed to read {}: {}", path.display(), e)))?;

        let header = ResourceHeader::decode(&raw)?;
        // mmap resources carry spare capacity after the stored bytes
        let available = &raw[HEADER_LEN..];
        let stored = usize::try_from(header.stored_len)
            .ok()
            .and_then(|len| available.get(..len))
            .ok_or_else(|| {
                Error::Corruption(format!(
                    "{}: header says {} stored bytes but only {} present",
                    name,
                    header.stored_len,
                    available.len()
                ))
            })?;
        let data = decompress(stored, header.compression)?;
        if data.len() as u64 != header.len {
            return Err(Error::Corruption(format!(
                "{}: payload length {} but header says {}",
                name,
                data.len(),
                header.len
            )));
        }

        debug!(name, len = data.len(), "Loaded heap store");
        Ok(Self {
            name: name.to_string(),
            directory: Some(directory.to_path_buf()),
            compression,
            capacity: data.len(),
            data,
            params: header.params,
        })
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub(crate) fn params_mut(&mut self) -> &mut [i64; PARAM_SLOTS] {
        &mut self.params
    }
}

impl ByteStore for HeapStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackingKind {
        BackingKind::Heap
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn set_len(&mut self, len: usize) -> Result<()> {
        if len > self.capacity {
            let capacity = grown_capacity(self.capacity, len);
            self.set_capacity(capacity)?;
        }
        self.data.resize(len, 0);
        Ok(())
    }

    fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        if capacity < self.data.len() {
            return Err(Error::OutOfBounds(format!(
                "{}: capacity {} below length {}",
                self.name,
                capacity,
                self.data.len()
            )));
        }
        if capacity > self.data.capacity() {
            self.data.reserve_exact(capacity - self.data.len());
        } else {
            self.data.shrink_to(capacity);
        }
        self.capacity = capacity;
        Ok(())
    }

    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn param(&self, slot: usize) -> Result<i64> {
        check_param_slot(&self.name, slot)?;
        Ok(self.params[slot])
    }

    fn set_param(&mut self, slot: usize, value: i64) -> Result<()> {
        check_param_slot(&self.name, slot)?;
        self.params[slot] = value;
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        let directory = self.directory.as_deref().ok_or_else(|| {
            Error::Unsupported(format!("{}: heap store has no directory", self.name))
        })?;
        std::fs::create_dir_all(directory)
            .map_err(|e| Error::Storage(format!("Failed to create store directory: {}", e)))?;

        let stored = compress(&self.data, self.compression)?;
        let header = ResourceHeader {
            compression: self.compression,
            params: self.params,
            len: self.data.len() as u64,
            stored_len: stored.len() as u64,
        };

        let path = resource_path(directory, &self.name);
        let temp_path = path.with_extension("vstore.tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| Error::Storage(format!("Failed to create temp resource: {}", e)))?;
        file.write_all(&header.encode())
            .map_err(|e| Error::Storage(format!("Failed to write header: {}", e)))?;
        file.write_all(&stored)
            .map_err(|e| Error::Storage(format!("Failed to write payload: {}", e)))?;
        file.sync_all()
            .map_err(|e| Error::Storage(format!("Failed to sync resource: {}", e)))?;
        std::fs::rename(&temp_path, &path)
            .map_err(|e| Error::Storage(format!("Failed to rename resource: {}", e)))?;

        info!(
            name = %self.name,
            len = self.data.len(),
            stored_len = stored.len(),
            "Persisted heap store"
        );
        Ok(())
    }

    fn copy_as(&self, name: &str) -> Result<Box<dyn ByteStore>> {
        let mut copy = HeapStore::new(name, self.directory.clone(), self.compression, self.capacity);
        copy.data.extend_from_slice(&self.data);
        copy.params = self.params;
        Ok(Box::new(copy))
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    fn close_and_delete(self: Box<Self>) -> Result<()> {
        if let Some(directory) = self.directory.as_deref() {
            let path = resource_path(directory, &self.name);
            if path.exists() {
                std::fs::remove_file(&path)
                    .map_err(|e| Error::Storage(format!("Failed to delete resource: {}", e)))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_heap_grow_and_truncate() -> Result<()> {
        let mut store = HeapStore::anonymous("heap");
        store.set_len(10)?;
        assert_eq!(store.len(), 10);
        assert!(store.capacity() >= 10);
        assert!(store.as_slice().iter().all(|&b| b == 0));

        store.set_byte(9, 7)?;
        store.set_len(4)?;
        store.set_len(10)?;
        // Regrown bytes are zero again
        assert_eq!(store.get_byte(9)?, 0);
        Ok(())
    }

    #[test]
    fn test_heap_compact() -> Result<()> {
        let mut store = HeapStore::anonymous("heap");
        store.set_len(100)?;
        store.set_len(3)?;
        store.compact()?;
        assert_eq!(store.capacity(), 3);
        assert!(store.set_capacity(2).is_err());
        Ok(())
    }

    #[test]
    fn test_heap_persist_and_load() -> Result<()> {
        let dir = tempdir().map_err(|e| Error::Storage(e.to_string()))?;
        for compression in [CompressionAlgorithm::None, CompressionAlgorithm::Zstd] {
            let mut store = HeapStore::new("persist", Some(dir.path().to_path_buf()), compression, 0);
            store.append(&[5u8; 300])?;
            store.set_param(0, 2)?;
            store.persist()?;

            let loaded = HeapStore::load("persist", dir.path(), compression)?;
            assert_eq!(loaded.as_slice(), &[5u8; 300][..]);
            assert_eq!(loaded.param(0)?, 2);
        }
        Ok(())
    }

    #[test]
    fn test_heap_load_ignores_trailing_capacity() -> Result<()> {
        let dir = tempdir().map_err(|e| Error::Storage(e.to_string()))?;
        let mut store = HeapStore::new("spare", Some(dir.path().to_path_buf()), CompressionAlgorithm::None, 0);
        store.append(b"abcd")?;
        store.persist()?;

        let path = resource_path(dir.path(), "spare");
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| Error::Storage(e.to_string()))?;
        file.write_all(&[0u8; 16]).map_err(|e| Error::Storage(e.to_string()))?;
        drop(file);
        let loaded = HeapStore::load("spare", dir.path(), CompressionAlgorithm::None)?;
        assert_eq!(loaded.as_slice(), b"abcd");

        let truncated = std::fs::metadata(&path)
            .map_err(|e| Error::Storage(e.to_string()))?
            .len()
            - 18;
        OpenOptions::new()
            .write(true)
            .open(&path)
            .and_then(|f| f.set_len(truncated))
            .map_err(|e| Error::Storage(e.to_string()))?;
        assert!(matches!(
            HeapStore::load("spare", dir.path(), CompressionAlgorithm::None),
            Err(Error::Corruption(_))
        ));
        Ok(())
    }

    #[test]
    fn test_heap_close_does_not_persist() -> Result<()> {
        let dir = tempdir().map_err(|e| Error::Storage(e.to_string()))?;
        let mut store = HeapStore::new("unsaved", Some(dir.path().to_path_buf()), CompressionAlgorithm::None, 0);
        store.append(b"xyz")?;
        Box::new(store).close()?;
        assert!(!resource_path(dir.path(), "unsaved").exists());
        Ok(())
    }

    #[test]
    fn test_heap_without_directory_cannot_persist() {
        let mut store = HeapStore::anonymous("nowhere");
        assert!(matches!(store.persist(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_heap_copy_as() -> Result<()> {
        let mut store = HeapStore::anonymous("src");
        store.append(b"abc")?;
        store.set_param(1, 42)?;
        let copy = store.copy_as("dst")?;
        assert_eq!(copy.name(), "dst");
        assert_eq!(copy.as_slice(), b"abc");
        assert_eq!(copy.param(1)?, 42);
        Ok(())
    }
}
