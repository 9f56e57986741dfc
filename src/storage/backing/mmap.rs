//! Memory-mapped byte store
//!
//! The resource file is the 64-byte header followed by `capacity` payload
//! bytes, mapped read/write in one piece:
//!
//! ```text
//! +---------------------------+
//! |    Header (64 bytes)      |  params + logical length live here
//! +---------------------------+
//! |    Payload [0, len)       |
//! +---------------------------+
//! |    Spare [len, capacity)  |
//! +---------------------------+
//! ```
//!
//! Growing the capacity flushes, extends the file and remaps. Since
//! `set_capacity` takes `&mut self`, no slice borrowed from the old mapping
//! can outlive the remap.

use super::header::{ResourceHeader, HEADER_LEN};
use super::{check_param_slot, grown_capacity, resource_path, BackingKind, ByteStore};
use crate::error::{Error, Result};
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug)]
pub struct MmapStore {
    name: String,
    directory: PathBuf,
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    len: usize,
    capacity: usize,
}

impl MmapStore {
    pub fn create(name: &str, directory: &Path, capacity: usize) -> Result<Self> {
        std::fs::create_dir_all(directory)
            .map_err(|e| Error::Storage(format!("Failed to create store directory: {}", e)))?;
        let path = resource_path(directory, name);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::Storage(format!("Failed to create {}: {}", path.display(), e)))?;
        file.set_len((HEADER_LEN + capacity) as u64)
            .map_err(|e| Error::Storage(format!("Failed to size {}: {}", path.display(), e)))?;

        // SAFETY: the file was just created with exclusive read/write access and
        // sized to hold the header; the mapping is owned by this store and every
        // access goes through bounds-checked slices of it.
        let mut mmap = unsafe {
            MmapMut::map_mut(&file)
                .map_err(|e| Error::Storage(format!("Failed to map {}: {}", path.display(), e)))?
        };
        mmap[..HEADER_LEN].copy_from_slice(&ResourceHeader::default().encode());

        info!(name, path = ?path, "Created mmap store");
        Ok(Self {
            name: name.to_string(),
            directory: directory.to_path_buf(),
            path,
            file,
            mmap,
            len: 0,
            capacity,
        })
    }

    pub fn open(name: &str, directory: &Path) -> Result<Self> {
        let path = resource_path(directory, name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::Storage(format!("Failed to open {}: {}", path.display(), e)))?;
        let file_len = file
            .metadata()
            .map_err(|e| Error::Storage(format!("Failed to stat {}: {}", path.display(), e)))?
            .len() as usize;
        if file_len < HEADER_LEN {
            return Err(Error::InvalidConfig(format!(
                "{}: file of {} bytes has no header",
                path.display(),
                file_len
            )));
        }

        // SAFETY: resource files are owned by a single writer process; the
        // mapping lives as long as this store and is only reached through
        // bounds-checked slices.
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .map_err(|e| Error::Storage(format!("Failed to map {}: {}", path.display(), e)))?
        };
        let header = ResourceHeader::decode(&mmap[..HEADER_LEN])?;
        if header.stored_len != header.len {
            return Err(Error::InvalidConfig(format!(
                "{}: compressed resources cannot be memory-mapped",
                name
            )));
        }
        let capacity = file_len - HEADER_LEN;
        let len = header.len as usize;
        if len > capacity {
            return Err(Error::Corruption(format!(
                "{}: header length {} exceeds file capacity {}",
                name, len, capacity
            )));
        }

        debug!(name, len, capacity, "Opened mmap store");
        Ok(Self {
            name: name.to_string(),
            directory: directory.to_path_buf(),
            path,
            file,
            mmap,
            len,
            capacity,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn remap(&mut self, capacity: usize) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| Error::Storage(format!("Failed to flush before remap: {}", e)))?;
        self.file
            .set_len((HEADER_LEN + capacity) as u64)
            .map_err(|e| Error::Storage(format!("Failed to resize {}: {}", self.path.display(), e)))?;

        // SAFETY: remap takes &mut self, so no slice into the old mapping is
        // alive; the old mapping was flushed and is dropped on assignment.
        self.mmap = unsafe {
            MmapMut::map_mut(&self.file)
                .map_err(|e| Error::Storage(format!("Failed to remap {}: {}", self.path.display(), e)))?
        };
        debug!(name = %self.name, from = self.capacity, to = capacity, "Remapped mmap store");
        self.capacity = capacity;
        Ok(())
    }
}

impl ByteStore for MmapStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackingKind {
        BackingKind::Mmap
    }

    fn len(&self) -> usize {
        self.len
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn set_len(&mut self, len: usize) -> Result<()> {
        if len > self.capacity {
            let capacity = grown_capacity(self.capacity, len);
            self.remap(capacity)?;
        }
        if len > self.len {
            self.mmap[HEADER_LEN + self.len..HEADER_LEN + len].fill(0);
        }
        self.len = len;
        ResourceHeader::write_len(&mut self.mmap[..HEADER_LEN], len as u64);
        Ok(())
    }

    fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        if capacity < self.len {
            return Err(Error::OutOfBounds(format!(
                "{}: capacity {} below length {}",
                self.name, capacity, self.len
            )));
        }
        if capacity != self.capacity {
            self.remap(capacity)?;
        }
        Ok(())
    }

    fn as_slice(&self) -> &[u8] {
        &self.mmap[HEADER_LEN..HEADER_LEN + self.len]
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap[HEADER_LEN..HEADER_LEN + self.len]
    }

    fn param(&self, slot: usize) -> Result<i64> {
        check_param_slot(&self.name, slot)?;
        Ok(ResourceHeader::decode(&self.mmap[..HEADER_LEN])?.params[slot])
    }

    fn set_param(&mut self, slot: usize, value: i64) -> Result<()> {
        check_param_slot(&self.name, slot)?;
        ResourceHeader::write_param(&mut self.mmap[..HEADER_LEN], slot, value);
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| Error::Storage(format!("Failed to sync {}: {}", self.path.display(), e)))
    }

    fn copy_as(&self, name: &str) -> Result<Box<dyn ByteStore>> {
        let mut copy = MmapStore::create(name, &self.directory, self.len)?;
        copy.set_len(self.len)?;
        copy.as_mut_slice().copy_from_slice(self.as_slice());
        copy.mmap[..HEADER_LEN].copy_from_slice(&self.mmap[..HEADER_LEN]);
        Ok(Box::new(copy))
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.persist()
    }

    fn close_and_delete(self: Box<Self>) -> Result<()> {
        let MmapStore { path, mmap, file, .. } = *self;
        drop(mmap);
        drop(file);
        std::fs::remove_file(&path)
            .map_err(|e| Error::Storage(format!("Failed to delete {}: {}", path.display(), e)))?;
        info!(path = ?path, "Deleted mmap store");
        Ok(())
    }
}
