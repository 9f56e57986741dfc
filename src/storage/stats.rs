//! Statistics snapshots
//!
//! Cheap, serializable views of a store's shape. Nothing here scans payload
//! except [`ChainStats::longest_chain`], which walks the count array.

use crate::storage::backing::BackingKind;
use serde::Serialize;

/// Statistics for a var array
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VarArrayStats {
    pub name: String,
    pub kind: BackingKind,
    pub width: usize,
    pub len: usize,
    pub capacity: usize,
    pub bytes: usize,
}

/// Statistics for an offset-indexed record store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordStoreStats {
    pub name: String,
    pub kind: BackingKind,
    pub records: usize,
    /// Payload length in items (bytes or vars)
    pub payload_len: usize,
    /// Var width of the payload; `None` for byte payloads
    pub payload_width: Option<usize>,
    pub offsets: VarArrayStats,
}

/// Statistics for a chain allocator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStats {
    pub chains: usize,
    pub link_slots: usize,
    pub links_in_use: usize,
    pub free_links: usize,
    pub longest_chain: usize,
    pub next_width: usize,
}

/// Statistics for a linked record store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedStoreStats {
    pub name: String,
    pub chains: ChainStats,
    pub values: VarArrayStats,
}
