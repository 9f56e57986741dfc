//! Offset-indexed record stores
//!
//! A record store is a flat payload plus an offset array one longer than the
//! record count:
//!
//! ```text
//! payload:  x x y y y z
//! offsets:  [0, 2, 5, 6]
//! rows:     0 = [0,2) "xx"   1 = [2,5) "yyy"   2 = [5,6) "z"
//! ```
//!
//! Invariants: `offsets[0] == 0`, offsets never decrease, and the last offset
//! equals the payload length. Rows may be empty.
//!
//! The offset array is persisted beside the payload as `<name>.Offs`.

pub mod bytes;
pub mod payload;
pub mod vars;

pub use bytes::ByteRecordStore;
pub use payload::{ByteData, RecordPayload};
pub use vars::VarRecordStore;

use crate::config::{self, StoreConfig};
use crate::error::{Error, Result};
use crate::storage::backing::{resource_name, store_exists, BackingKind};
use crate::storage::stats::RecordStoreStats;
use crate::storage::var::VarArray;
use tracing::{debug, info, warn};

pub const OFFSETS_SUFFIX: &str = "Offs";

/// Offsets copied per batch in `append_from`
const REBASE_CHUNK: usize = 4096;

/// Variable-length rows over a payload store
#[derive(Debug)]
pub struct OffsetIndexedStore<P: RecordPayload> {
    payload: P,
    offsets: VarArray,
}

impl<P: RecordPayload> OffsetIndexedStore<P> {
    /// Create an empty store named `name` (payload) and `name.Offs`
    pub fn create(name: &str, config: &StoreConfig) -> Result<Self> {
        let payload = P::create_named(name, config)?;
        let mut offsets = VarArray::create(&resource_name(name, OFFSETS_SUFFIX), config)?;
        offsets.push(0)?;
        info!(name, kind = %config.backing, "Created record store");
        Ok(Self { payload, offsets })
    }

    /// Open a persisted store; a missing offset array is a config error
    pub fn open(name: &str, config: &StoreConfig) -> Result<Self> {
        let offsets_name = resource_name(name, OFFSETS_SUFFIX);
        if !store_exists(&offsets_name, config) {
            return Err(Error::InvalidConfig(format!(
                "{}: missing offset array {}",
                name, offsets_name
            )));
        }
        let payload = P::open_named(name, config)?;
        let offsets = VarArray::open(&offsets_name, config)?;
        let store = Self::wrap(payload, offsets)?;
        info!(name, records = store.len(), "Opened record store");
        Ok(store)
    }

    /// Adopt a payload and offset array built elsewhere
    pub fn wrap(payload: P, offsets: VarArray) -> Result<Self> {
        if offsets.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "{}: offset array is empty",
                payload.name()
            )));
        }
        let first = offsets.get(0)?;
        let last = offsets.get(offsets.len() - 1)?;
        if first != 0 || last != payload.len() as i64 {
            return Err(Error::Corruption(format!(
                "{}: offsets span [{}, {}] but payload length is {}",
                payload.name(),
                first,
                last,
                payload.len()
            )));
        }
        Ok(Self { payload, offsets })
    }

    /// In-memory store, never persisted
    pub fn in_memory(name: &str) -> Result<Self> {
        Self::create(name, &StoreConfig::in_memory())
    }

    pub fn name(&self) -> &str {
        self.payload.name()
    }

    pub fn kind(&self) -> BackingKind {
        self.payload.kind()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload length in items
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    pub fn offset(&self, index: usize) -> Result<usize> {
        Ok(self.offsets.get(index)? as usize)
    }

    /// Grow with empty rows, or truncate rows and payload from the tail
    pub fn set_len(&mut self, records: usize) -> Result<()> {
        let current = self.len();
        if records > current {
            let end = self.payload.len() as i64;
            self.offsets.push_repeated(end, records - current)?;
        } else if records < current {
            let end = self.offset(records)?;
            self.offsets.set_len(records + 1)?;
            self.payload.set_len(end)?;
        }
        Ok(())
    }

    pub fn row_len(&self, index: usize) -> Result<usize> {
        self.check_row(index)?;
        let (start, end) = self.row_bounds(index)?;
        Ok(end - start)
    }

    /// Longest row (full scan)
    pub fn max_row_len(&self) -> usize {
        let mut longest = 0;
        let mut previous = 0;
        for offset in self.offsets.iter().skip(1) {
            longest = longest.max((offset - previous).max(0) as usize);
            previous = offset;
        }
        longest
    }

    pub fn get(&self, index: usize) -> Result<Vec<P::Item>> {
        let mut row = Vec::new();
        self.get_into(index, &mut row)?;
        Ok(row)
    }

    /// Read a row into a caller-provided buffer
    pub fn get_into(&self, index: usize, out: &mut Vec<P::Item>) -> Result<()> {
        self.check_row(index)?;
        let (start, end) = self.row_bounds(index)?;
        out.clear();
        out.resize(end - start, P::Item::default());
        self.payload.read(start, out)
    }

    /// Read `count` items starting `within` items into row `index`
    pub fn get_range(&self, index: usize, within: usize, count: usize) -> Result<Vec<P::Item>> {
        let start = self.row_position(index, within, count)?;
        let mut out = vec![P::Item::default(); count];
        self.payload.read(start, &mut out)?;
        Ok(out)
    }

    /// Overwrite items inside row `index`; the row length never changes
    pub fn set_range(&mut self, index: usize, within: usize, items: &[P::Item]) -> Result<()> {
        let start = self.row_position(index, within, items.len())?;
        self.payload.write(start, items)
    }

    /// Append a row, returning its index
    pub fn push(&mut self, items: &[P::Item]) -> Result<usize> {
        let index = self.len();
        self.payload.append(items)?;
        let end = self.payload.len() as i64;
        if config::range_checking() {
            let previous = self.offsets.get(index)?;
            if end < previous {
                return Err(Error::Corruption(format!(
                    "{}: offset {} would precede {}",
                    self.name(),
                    end,
                    previous
                )));
            }
        }
        self.offsets.push(end)?;
        Ok(index)
    }

    /// Append all rows of `other`
    pub fn append_all(&mut self, other: &Self) -> Result<()> {
        self.append_from(other, 0, other.len())
    }

    /// Append rows `[start, start + count)` of `other`.
    ///
    /// The payload slice is copied in one piece, then each copied offset is
    /// shifted by the distance between where the slice started in `other`
    /// and where it lands here.
    pub fn append_from(&mut self, other: &Self, start: usize, count: usize) -> Result<()> {
        other.check_rows(start, count)?;
        if count == 0 {
            return Ok(());
        }
        let (src_begin, src_end) = other.span_bounds(start, count)?;
        let base = self.payload.len();
        self.payload
            .append_range(&other.payload, src_begin, src_end - src_begin)?;

        let delta = base as i64 - src_begin as i64;
        let mut scratch = vec![0i64; count.min(REBASE_CHUNK)];
        let mut done = 0;
        while done < count {
            let n = (count - done).min(scratch.len());
            other.offsets.get_many(start + 1 + done, &mut scratch[..n])?;
            for offset in scratch[..n].iter_mut() {
                *offset += delta;
            }
            self.offsets.extend_from_slice(&scratch[..n])?;
            done += n;
        }

        if config::range_checking() {
            self.check_tail_monotone(count + 1)?;
        }
        debug!(
            name = self.name(),
            from = other.name(),
            rows = count,
            delta,
            "Appended rows from store"
        );
        Ok(())
    }

    /// Last row whose start offset is `<= position`, i.e. the row owning
    /// payload item `position`. `None` outside `[0, payload_len)`.
    pub fn last_index_at_or_before(&self, position: usize) -> Result<Option<usize>> {
        if position >= self.payload.len() {
            return Ok(None);
        }
        // largest i in [0, len) with offsets[i] <= position
        let (mut lo, mut hi) = (0usize, self.len());
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if self.offset(mid)? <= position {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok(Some(lo))
    }

    /// Row containing payload item `position`
    pub fn row_containing(&self, position: usize) -> Result<Option<usize>> {
        self.last_index_at_or_before(position)
    }

    /// First row whose start offset is `>= position`. `None` outside
    /// `[0, payload_len)` or when every row starts before `position`.
    pub fn first_index_at_or_after(&self, position: usize) -> Result<Option<usize>> {
        if position >= self.payload.len() {
            return Ok(None);
        }
        // smallest i in [0, len) with offsets[i] >= position
        let (mut lo, mut hi) = (0usize, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.offset(mid)? < position {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(if lo < self.len() { Some(lo) } else { None })
    }

    pub fn row_hash(&self, index: usize) -> Result<u64> {
        Ok(P::hash_items(&self.get(index)?))
    }

    pub fn iter(&self) -> RowIter<'_, P> {
        RowIter {
            store: self,
            next: 0,
        }
    }

    /// Back to zero records, keeping the backing resources
    pub fn clear(&mut self) -> Result<()> {
        self.offsets.set_len(0)?;
        self.offsets.push(0)?;
        self.payload.set_len(0)
    }

    /// Drop payload beyond the last offset, then trim capacity
    pub fn compact(&mut self) -> Result<()> {
        let end = self.offset(self.len())?;
        self.payload.set_len(end)?;
        self.payload.compact()?;
        self.offsets.compact()
    }

    pub fn ensure_capacity(&mut self, records: usize, payload_items: usize) -> Result<()> {
        self.offsets.ensure_capacity(records + 1)?;
        self.payload.ensure_capacity(payload_items)
    }

    /// Verify the offset invariants.
    ///
    /// Monotonicity is checked over the whole array for heap stores and over
    /// the tail window for mmap stores, unless range checking is on.
    pub fn sanity_check(&self) -> Result<()> {
        self.offsets.sanity_check()?;
        if self.offsets.is_empty() {
            return Err(self.corruption("offset array is empty".to_string()));
        }
        let first = self.offsets.get(0)?;
        if first != 0 {
            return Err(self.corruption(format!("first offset is {}", first)));
        }
        let last = self.offsets.get(self.len())?;
        if last != self.payload.len() as i64 {
            return Err(self.corruption(format!(
                "last offset {} but payload length {}",
                last,
                self.payload.len()
            )));
        }
        let window = if self.kind() == BackingKind::Mmap && !config::range_checking() {
            self.offsets.tuning().sanity_window
        } else {
            self.offsets.len()
        };
        self.check_tail_monotone(window)
    }

    pub fn stats(&self) -> RecordStoreStats {
        RecordStoreStats {
            name: self.name().to_string(),
            kind: self.kind(),
            records: self.len(),
            payload_len: self.payload.len(),
            payload_width: self.payload.width(),
            offsets: self.offsets.stats(),
        }
    }

    /// Persist payload and offsets
    pub fn persist(&mut self) -> Result<()> {
        self.payload.persist()?;
        self.offsets.persist()?;
        debug!(name = self.name(), records = self.len(), "Persisted record store");
        Ok(())
    }

    /// Copy both resources under a new name
    pub fn copy_as(&self, name: &str) -> Result<Self> {
        let payload = self.payload.copy_as(name)?;
        let offsets = self
            .offsets
            .copy_as(&resource_name(name, OFFSETS_SUFFIX))?;
        Ok(Self { payload, offsets })
    }

    pub fn close(self) -> Result<()> {
        self.payload.close()?;
        self.offsets.close()
    }

    pub fn close_and_delete(self) -> Result<()> {
        let name = self.name().to_string();
        self.payload.close_and_delete()?;
        self.offsets.close_and_delete()?;
        info!(name = %name, "Deleted record store");
        Ok(())
    }

    pub(crate) fn payload(&self) -> &P {
        &self.payload
    }

    pub(crate) fn payload_mut(&mut self) -> &mut P {
        &mut self.payload
    }

    pub(crate) fn offsets_mut(&mut self) -> &mut VarArray {
        &mut self.offsets
    }

    fn row_bounds(&self, index: usize) -> Result<(usize, usize)> {
        self.span_bounds(index, 1)
    }

    /// Payload range covered by rows `[first, first + count)`
    fn span_bounds(&self, first: usize, count: usize) -> Result<(usize, usize)> {
        let start = self.offsets.get(first)?;
        let end = self.offsets.get(first + count)?;
        if start < 0 || end < start || end > self.payload.len() as i64 {
            return Err(self.corruption(format!(
                "rows [{}, +{}) span offsets [{}, {}) over payload length {}",
                first,
                count,
                start,
                end,
                self.payload.len()
            )));
        }
        Ok((start as usize, end as usize))
    }

    fn row_position(&self, index: usize, within: usize, count: usize) -> Result<usize> {
        self.check_row(index)?;
        let (start, end) = self.row_bounds(index)?;
        let row_len = end - start;
        match within.checked_add(count) {
            Some(stop) if stop <= row_len => Ok(start + within),
            _ => Err(Error::OutOfBounds(format!(
                "{}: [{}, +{}) past end of row {} (length {})",
                self.name(),
                within,
                count,
                index,
                row_len
            ))),
        }
    }

    fn check_row(&self, index: usize) -> Result<()> {
        self.check_rows(index, 1)
    }

    fn check_rows(&self, start: usize, count: usize) -> Result<()> {
        match start.checked_add(count) {
            Some(end) if end <= self.len() => Ok(()),
            _ => Err(Error::OutOfBounds(format!(
                "{}: rows [{}, +{}) outside record count {}",
                self.name(),
                start,
                count,
                self.len()
            ))),
        }
    }

    /// Offsets in the last `window` entries never decrease
    fn check_tail_monotone(&self, window: usize) -> Result<()> {
        let len = self.offsets.len();
        let begin = len.saturating_sub(window.max(1));
        let mut previous = self.offsets.get(begin)?;
        for index in begin + 1..len {
            let offset = self.offsets.get(index)?;
            if offset < previous {
                return Err(self.corruption(format!(
                    "offset[{}] = {} precedes offset[{}] = {}",
                    index,
                    offset,
                    index - 1,
                    previous
                )));
            }
            previous = offset;
        }
        Ok(())
    }

    fn corruption(&self, detail: String) -> Error {
        warn!(name = self.name(), detail = %detail, "Record store sanity check failed");
        Error::Corruption(format!("{}: {}", self.name(), detail))
    }
}

/// Iterator over rows, yielding each row's items
pub struct RowIter<'a, P: RecordPayload> {
    store: &'a OffsetIndexedStore<P>,
    next: usize,
}

impl<'a, P: RecordPayload> Iterator for RowIter<'a, P> {
    type Item = Result<Vec<P::Item>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.store.len() {
            return None;
        }
        let row = self.store.get(self.next);
        self.next += 1;
        Some(row)
    }
}
