//! Storage layer
//!
//! # Architecture
//!
//! Three layers, each built only on the one below:
//!
//! ```text
//! ByteStore (heap | mmap)            linear bytes + params, persisted by name
//!   └─→ VarArray                     packed i64s at one adaptive width
//!        ├─→ OffsetIndexedStore<P>   variable-length rows: payload + <name>.Offs
//!        │     ├─ ByteRecordStore    rows of bytes / UTF-8 strings
//!        │     └─ VarRecordStore     rows of vars
//!        └─→ ChainAllocator          circular lists: <name>.Next / .Last / .N
//!              └─ LinkedRecordStore  one growable var list per chain
//! ```
//!
//! ## Persistence
//!
//! Every resource is one `<directory>/<name>.vstore` file: a 64-byte header
//! (magic, version, compression flag, params, lengths) followed by the data.
//! Composite stores own several resources that share a base name and are
//! always persisted, copied and deleted together.
//!
//! ## Checking
//!
//! Index bounds are always checked. The global range checking mode
//! ([`crate::config::set_range_checking`]) adds the checks that cost more
//! than O(1). `sanity_check` on any store verifies its structural invariants.
//!
//! The [`dangerous`] module exposes the raw arrays for repair tools.

pub mod backing;
pub mod chain;
pub mod dangerous;
pub mod data;
pub mod stats;
pub mod var;

pub use backing::{
    create_store, delete_store, open_store, store_exists, BackingKind, ByteStore,
    CompressionAlgorithm, HeapStore, MmapStore,
};
pub use chain::{ChainAllocator, LinkedRecordStore};
pub use data::{ByteData, ByteRecordStore, OffsetIndexedStore, RecordPayload, VarRecordStore};
pub use stats::{ChainStats, LinkedStoreStats, RecordStoreStats, VarArrayStats};
pub use var::VarArray;
