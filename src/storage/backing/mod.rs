//! Byte backing stores
//!
//! A [`ByteStore`] is a linear, byte-addressable region with a dynamic
//! length bounded by a capacity, a handful of integer params, and a name
//! under which it can be persisted. Everything above this layer (var
//! arrays, record stores, chain pools) talks to `Box<dyn ByteStore>` only.
//!
//! ```text
//! ByteStore
//!   ├─→ HeapStore  (Vec<u8>, written to <dir>/<name>.vstore on persist)
//!   └─→ MmapStore  (<dir>/<name>.vstore mapped read/write)
//! ```

pub mod compression;
pub mod header;
pub mod heap;
pub mod mmap;

pub use compression::CompressionAlgorithm;
pub use header::PARAM_SLOTS;
pub use heap::HeapStore;
pub use mmap::MmapStore;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FILE_EXTENSION: &str = "vstore";

/// Which backing implementation a store uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackingKind {
    #[default]
    Heap,
    Mmap,
}

impl fmt::Display for BackingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackingKind::Heap => write!(f, "heap"),
            BackingKind::Mmap => write!(f, "mmap"),
        }
    }
}

/// Fixed-capacity, resizable byte buffer with persistence
pub trait ByteStore: fmt::Debug + Send {
    fn name(&self) -> &str;

    fn kind(&self) -> BackingKind;

    /// Current logical length in bytes
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes available before the store has to grow
    fn capacity(&self) -> usize;

    /// Extend (zero-filled) or truncate to `len` bytes
    fn set_len(&mut self, len: usize) -> Result<()>;

    /// Set capacity; fails if smaller than the current length
    fn set_capacity(&mut self, capacity: usize) -> Result<()>;

    fn ensure_capacity(&mut self, capacity: usize) -> Result<()> {
        if capacity > self.capacity() {
            self.set_capacity(capacity)?;
        }
        Ok(())
    }

    /// Shrink capacity to the current length
    fn compact(&mut self) -> Result<()> {
        let len = self.len();
        self.set_capacity(len)
    }

    /// The live bytes `[0, len)`
    fn as_slice(&self) -> &[u8];

    fn as_mut_slice(&mut self) -> &mut [u8];

    fn get_bytes(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        check_range(self.name(), offset, dst.len(), self.len())?;
        dst.copy_from_slice(&self.as_slice()[offset..offset + dst.len()]);
        Ok(())
    }

    fn set_bytes(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        check_range(self.name(), offset, src.len(), self.len())?;
        self.as_mut_slice()[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn get_byte(&self, offset: usize) -> Result<u8> {
        check_range(self.name(), offset, 1, self.len())?;
        Ok(self.as_slice()[offset])
    }

    fn set_byte(&mut self, offset: usize, value: u8) -> Result<()> {
        check_range(self.name(), offset, 1, self.len())?;
        self.as_mut_slice()[offset] = value;
        Ok(())
    }

    /// Wrapping add to a single byte
    fn add_to_byte(&mut self, offset: usize, delta: u8) -> Result<()> {
        check_range(self.name(), offset, 1, self.len())?;
        let slot = &mut self.as_mut_slice()[offset];
        *slot = slot.wrapping_add(delta);
        Ok(())
    }

    /// Append bytes at the end, growing capacity geometrically
    fn append(&mut self, src: &[u8]) -> Result<()> {
        let start = self.len();
        self.set_len(start + src.len())?;
        self.as_mut_slice()[start..].copy_from_slice(src);
        Ok(())
    }

    fn param(&self, slot: usize) -> Result<i64>;

    fn set_param(&mut self, slot: usize, value: i64) -> Result<()>;

    /// Write the store to its resource
    fn persist(&mut self) -> Result<()>;

    /// Copy content and params into a new store of the same kind
    fn copy_as(&self, name: &str) -> Result<Box<dyn ByteStore>>;

    /// Release the store. Mmap stores flush their mapping; heap stores drop
    /// anything not yet written by `persist`
    fn close(self: Box<Self>) -> Result<()>;

    /// Release the store and remove its resource
    fn close_and_delete(self: Box<Self>) -> Result<()>;
}

/// Name of an auxiliary resource: `base.Suffix`
pub fn resource_name(base: &str, suffix: &str) -> String {
    format!("{}.{}", base, suffix)
}

/// File path of a named resource inside `directory`
pub fn resource_path(directory: &Path, name: &str) -> PathBuf {
    directory.join(format!("{}.{}", name, FILE_EXTENSION))
}

/// Create an empty store of the configured kind
pub fn create_store(name: &str, config: &StoreConfig) -> Result<Box<dyn ByteStore>> {
    config.validate()?;
    let store: Box<dyn ByteStore> = match config.backing {
        BackingKind::Heap => Box::new(HeapStore::new(
            name,
            config.directory.clone(),
            config.compression,
            config.initial_capacity,
        )),
        BackingKind::Mmap => {
            let directory = require_directory(config)?;
            Box::new(MmapStore::create(
                name,
                directory,
                config.initial_capacity,
            )?)
        }
    };
    debug!(name, kind = %config.backing, "Created byte store");
    Ok(store)
}

/// Open a persisted store of the configured kind
pub fn open_store(name: &str, config: &StoreConfig) -> Result<Box<dyn ByteStore>> {
    config.validate()?;
    let directory = require_directory(config)?;
    let store: Box<dyn ByteStore> = match config.backing {
        BackingKind::Heap => Box::new(HeapStore::load(name, directory, config.compression)?),
        BackingKind::Mmap => Box::new(MmapStore::open(name, directory)?),
    };
    debug!(name, kind = %config.backing, len = store.len(), "Opened byte store");
    Ok(store)
}

/// Whether a persisted resource exists
pub fn store_exists(name: &str, config: &StoreConfig) -> bool {
    config
        .directory
        .as_deref()
        .map(|dir| resource_path(dir, name).exists())
        .unwrap_or(false)
}

/// Delete a persisted resource; missing resources are not an error
pub fn delete_store(name: &str, config: &StoreConfig) -> Result<()> {
    let Some(directory) = config.directory.as_deref() else {
        return Ok(());
    };
    let path = resource_path(directory, name);
    if path.exists() {
        std::fs::remove_file(&path).map_err(|e| {
            Error::Storage(format!("Failed to delete {}: {}", path.display(), e))
        })?;
        info!(name, "Deleted resource");
    }
    Ok(())
}

fn require_directory(config: &StoreConfig) -> Result<&Path> {
    config.directory.as_deref().ok_or_else(|| {
        Error::Unsupported(format!(
            "{} stores need a directory to be opened",
            config.backing
        ))
    })
}

pub(crate) fn check_range(name: &str, offset: usize, len: usize, size: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::OutOfBounds(format!(
            "{}: bytes [{}, +{}) outside length {}",
            name, offset, len, size
        ))),
    }
}

pub(crate) fn check_param_slot(name: &str, slot: usize) -> Result<()> {
    if slot >= PARAM_SLOTS {
        return Err(Error::OutOfBounds(format!(
            "{}: param slot {} >= {}",
            name, slot, PARAM_SLOTS
        )));
    }
    Ok(())
}

/// Next capacity when growing to at least `needed` bytes
pub(crate) fn grown_capacity(current: usize, needed: usize) -> usize {
    needed.max(current + current / 2).max(64)
}
