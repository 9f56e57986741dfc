//! Store configuration
//!
//! Every store is created or opened against a [`StoreConfig`]. The config
//! picks the backing implementation, where persisted resources live, and a
//! handful of tuning knobs. It deserializes from TOML with every field
//! optional:
//!
//! ```toml
//! backing = "mmap"
//! directory = "data/terms"
//! compression = "zstd"
//! initial_width = 2
//! range_checking = true
//! ```

use crate::error::{Error, Result};
use crate::storage::backing::compression::CompressionAlgorithm;
use crate::storage::backing::BackingKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

static RANGE_CHECKING: AtomicBool = AtomicBool::new(false);

/// Enable or disable the process-wide range checking mode.
///
/// Bounds checks on indexes are always performed. This mode adds the
/// structural checks that cost more than O(1): offset monotonicity on every
/// append, chain membership of caller-supplied links, and unsampled
/// sanity scans.
pub fn set_range_checking(enabled: bool) {
    RANGE_CHECKING.store(enabled, Ordering::Relaxed);
}

/// Whether the global range checking mode is on.
pub fn range_checking() -> bool {
    RANGE_CHECKING.load(Ordering::Relaxed)
}

/// Tuning values carried by every var array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuning {
    /// Tail window (elements) and chain sample size for cheap sanity checks
    pub sanity_window: usize,
    /// Number of vars re-encoded per chunk when the width changes
    pub resize_chunk: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            sanity_window: 1024,
            resize_chunk: 1 << 16,
        }
    }
}

/// Configuration shared by all stores opened from one place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backing implementation for new and opened resources
    pub backing: BackingKind,
    /// Directory holding persisted resources
    pub directory: Option<PathBuf>,
    /// Compression applied when heap resources are persisted
    pub compression: CompressionAlgorithm,
    /// Width of freshly created var arrays
    pub initial_width: u8,
    /// Bytes reserved up front for freshly created resources
    pub initial_capacity: usize,
    /// Turn on the global range checking mode when this config is loaded
    pub range_checking: bool,
    pub sanity_window: usize,
    pub resize_chunk: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let tuning = Tuning::default();
        Self {
            backing: BackingKind::Heap,
            directory: None,
            compression: CompressionAlgorithm::None,
            initial_width: 1,
            initial_capacity: 0,
            range_checking: false,
            sanity_window: tuning.sanity_window,
            resize_chunk: tuning.resize_chunk,
        }
    }
}

impl StoreConfig {
    /// In-memory heap stores, nothing persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Heap stores persisted under `directory`.
    pub fn heap<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: Some(directory.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Memory-mapped stores under `directory`.
    pub fn mmap<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            backing: BackingKind::Mmap,
            directory: Some(directory.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_initial_width(mut self, width: u8) -> Self {
        self.initial_width = width;
        self
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(text)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file and apply its range checking flag.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Storage(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)?;
        if config.range_checking {
            set_range_checking(true);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=8).contains(&self.initial_width) {
            return Err(Error::InvalidConfig(format!(
                "initial_width {} outside [1, 8]",
                self.initial_width
            )));
        }
        if self.resize_chunk == 0 {
            return Err(Error::InvalidConfig("resize_chunk must be at least 1".to_string()));
        }
        if self.backing == BackingKind::Mmap && self.directory.is_none() {
            return Err(Error::InvalidConfig(
                "mmap backing requires a directory".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tuning(&self) -> Tuning {
        Tuning {
            sanity_window: self.sanity_window,
            resize_chunk: self.resize_chunk.max(1),
        }
    }
}
