//! Multi-chain link pools
//!
//! A [`ChainAllocator`] keeps any number of circular singly-linked lists in
//! three var arrays:
//!
//! ```text
//! <name>.Next   next[link]          successor of each link
//! <name>.Last   last[chain + 1]     tail link of each chain, or -1
//! <name>.N      count[chain + 1]    links in each chain
//! ```
//!
//! Slot 0 of `Last`/`N` is the free chain. Removed links are appended to it
//! and handed out again from its head, oldest first, before the pool grows.
//! Every link slot belongs to exactly one chain (free included), so the
//! counts always sum to the pool size.
//!
//! [`LinkedRecordStore`] adds a value array beside the pool to get one
//! growable list of integers per chain.

pub mod allocator;
pub mod linked;

pub use allocator::{ChainAllocator, ChainLinks};
pub use linked::LinkedRecordStore;
