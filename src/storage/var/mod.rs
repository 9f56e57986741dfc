//! Packed variable-width integer arrays
//!
//! A [`VarArray`] stores signed integers at one fixed width for the whole
//! array, chosen as the narrowest width that holds every value written so
//! far:
//!
//! ```text
//! width 1:  [05][FB][7F]                  5, -5, 127
//! set(1, 200)  → whole array re-encoded
//! width 2:  [05 00][C8 00][7F 00]         5, 200, 127
//! ```
//!
//! Writes widen automatically; narrowing only happens through
//! [`VarArray::shrink_width_to_fit`] or the dangerous tier.
//!
//! The width is persisted in param slot 0 of the backing store.

pub mod codec;

use crate::config::{StoreConfig, Tuning};
use crate::error::{Error, Result};
use crate::storage::backing::{create_store, open_store, BackingKind, ByteStore, HeapStore};
use crate::storage::stats::VarArrayStats;
use tracing::debug;

pub use codec::{MAX_WIDTH, MIN_WIDTH};

/// Param slot holding the var width
pub const WIDTH_PARAM: usize = 0;

/// Scratch size (in vars) for bulk copies between arrays of different widths
const COPY_CHUNK: usize = 4096;

#[derive(Debug)]
pub struct VarArray {
    store: Box<dyn ByteStore>,
    width: usize,
    tuning: Tuning,
}

impl VarArray {
    /// Create an empty array at the configured initial width
    pub fn create(name: &str, config: &StoreConfig) -> Result<Self> {
        let mut store = create_store(name, config)?;
        let width = config.initial_width as usize;
        validate_width(width)?;
        store.set_param(WIDTH_PARAM, width as i64)?;
        Ok(Self {
            store,
            width,
            tuning: config.tuning(),
        })
    }

    /// Open a persisted array
    pub fn open(name: &str, config: &StoreConfig) -> Result<Self> {
        let store = open_store(name, config)?;
        Self::wrap(store, config.tuning())
    }

    /// Adopt an existing byte store. An empty store without a width param
    /// starts at width 1.
    pub fn wrap(mut store: Box<dyn ByteStore>, tuning: Tuning) -> Result<Self> {
        let mut width = store.param(WIDTH_PARAM)?;
        if width == 0 && store.is_empty() {
            width = MIN_WIDTH as i64;
            store.set_param(WIDTH_PARAM, width)?;
        }
        if !(MIN_WIDTH as i64..=MAX_WIDTH as i64).contains(&width) {
            return Err(Error::InvalidConfig(format!(
                "{}: stored var width {} outside [1, 8]",
                store.name(),
                width
            )));
        }
        let width = width as usize;
        if store.len() % width != 0 {
            return Err(Error::Corruption(format!(
                "{}: byte length {} not a multiple of width {}",
                store.name(),
                store.len(),
                width
            )));
        }
        Ok(Self {
            store,
            width,
            tuning,
        })
    }

    /// Anonymous heap array, never persisted
    pub fn in_memory(name: &str) -> Self {
        let mut store = HeapStore::anonymous(name);
        store.params_mut()[WIDTH_PARAM] = MIN_WIDTH as i64;
        Self {
            store: Box::new(store),
            width: MIN_WIDTH,
            tuning: Tuning::default(),
        }
    }

    pub fn name(&self) -> &str {
        self.store.name()
    }

    pub fn kind(&self) -> BackingKind {
        self.store.kind()
    }

    pub fn tuning(&self) -> Tuning {
        self.tuning
    }

    /// Bytes per var
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.store.len() / self.width
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Vars that fit before the backing store has to grow
    pub fn capacity(&self) -> usize {
        self.store.capacity() / self.width
    }

    /// Extend with zeros or truncate
    pub fn set_len(&mut self, len: usize) -> Result<()> {
        let bytes = self.byte_len(len)?;
        self.store.set_len(bytes)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.store.set_len(0)
    }

    pub fn ensure_capacity(&mut self, vars: usize) -> Result<()> {
        let bytes = self.byte_len(vars)?;
        self.store.ensure_capacity(bytes)
    }

    pub fn compact(&mut self) -> Result<()> {
        self.store.compact()
    }

    pub fn get(&self, index: usize) -> Result<i64> {
        self.check_range(index, 1)?;
        let at = index * self.width;
        Ok(codec::decode(&self.store.as_slice()[at..at + self.width]))
    }

    pub fn set(&mut self, index: usize, value: i64) -> Result<()> {
        self.check_range(index, 1)?;
        self.ensure_width(codec::width_for(value))?;
        let width = self.width;
        let at = index * width;
        codec::encode(value, &mut self.store.as_mut_slice()[at..at + width]);
        Ok(())
    }

    /// Read `out.len()` vars starting at `start`
    pub fn get_many(&self, start: usize, out: &mut [i64]) -> Result<()> {
        self.check_range(start, out.len())?;
        let width = self.width;
        let bytes = &self.store.as_slice()[start * width..(start + out.len()) * width];
        for (slot, raw) in out.iter_mut().zip(bytes.chunks_exact(width)) {
            *slot = codec::decode(raw);
        }
        Ok(())
    }

    /// Overwrite `values.len()` vars starting at `start`, widening once
    pub fn set_many(&mut self, start: usize, values: &[i64]) -> Result<()> {
        self.check_range(start, values.len())?;
        self.ensure_width(codec::width_for_all(values))?;
        self.encode_at(start, values);
        Ok(())
    }

    /// Add `delta` to the var at `index`, widening if needed
    pub fn add_to(&mut self, index: usize, delta: i64) -> Result<i64> {
        let current = self.get(index)?;
        if delta == 0 {
            return Ok(current);
        }
        let value = current.checked_add(delta).ok_or_else(|| {
            Error::OutOfBounds(format!(
                "{}: {} + {} overflows i64 at {}",
                self.name(),
                current,
                delta,
                index
            ))
        })?;
        self.set(index, value)?;
        Ok(value)
    }

    /// Append one var, returning its index
    pub fn push(&mut self, value: i64) -> Result<usize> {
        self.ensure_width(codec::width_for(value))?;
        let index = self.len();
        self.store.set_len((index + 1) * self.width)?;
        self.encode_at(index, &[value]);
        Ok(index)
    }

    pub fn extend_from_slice(&mut self, values: &[i64]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        self.ensure_width(codec::width_for_all(values))?;
        let start = self.len();
        self.store.set_len((start + values.len()) * self.width)?;
        self.encode_at(start, values);
        Ok(())
    }

    /// Append `value` `count` times
    pub fn push_repeated(&mut self, value: i64, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let start = self.len();
        let end = start.checked_add(count).ok_or_else(|| self.overflow(count))?;
        self.ensure_width(codec::width_for(value))?;
        let bytes = self.byte_len(end)?;
        self.store.set_len(bytes)?;
        if value != 0 {
            self.fill_unchecked(start, count, value);
        }
        Ok(())
    }

    /// Set `count` vars starting at `start` to `value`
    pub fn fill(&mut self, start: usize, count: usize, value: i64) -> Result<()> {
        self.check_range(start, count)?;
        self.ensure_width(codec::width_for(value))?;
        self.fill_unchecked(start, count, value);
        Ok(())
    }

    /// Append `count` vars of `src` starting at `start`
    pub fn append_range(&mut self, src: &VarArray, start: usize, count: usize) -> Result<()> {
        src.check_range(start, count)?;
        if count == 0 {
            return Ok(());
        }
        // same width: raw byte copy; otherwise decode so only the copied
        // values decide the destination width
        if self.width == src.width {
            let width = self.width;
            let bytes = &src.store.as_slice()[start * width..(start + count) * width];
            return self.store.append(bytes);
        }

        let mut scratch = vec![0i64; count.min(COPY_CHUNK)];
        let mut done = 0;
        while done < count {
            let n = (count - done).min(scratch.len());
            src.get_many(start + done, &mut scratch[..n])?;
            self.extend_from_slice(&scratch[..n])?;
            done += n;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.store
            .as_slice()
            .chunks_exact(self.width)
            .map(codec::decode)
    }

    pub fn to_vec(&self) -> Vec<i64> {
        self.iter().collect()
    }

    /// Narrowest width holding every stored value (full scan)
    pub fn min_width_required(&self) -> usize {
        self.iter()
            .map(codec::width_for)
            .max()
            .unwrap_or(MIN_WIDTH)
    }

    /// Grow the width to at least `width`; never narrows
    pub fn ensure_width(&mut self, width: usize) -> Result<()> {
        if width > self.width {
            self.change_width(width)?;
        }
        Ok(())
    }

    /// Narrow to [`VarArray::min_width_required`]. Lossless.
    pub fn shrink_width_to_fit(&mut self) -> Result<()> {
        let required = self.min_width_required();
        if required < self.width {
            self.change_width(required)?;
        }
        Ok(())
    }

    /// Content hash of one value
    pub fn hash(value: i64) -> u64 {
        codec::hash_value(value)
    }

    /// Content hash of a value sequence
    pub fn hash_slice(values: &[i64]) -> u64 {
        codec::hash_values(values)
    }

    /// Content hash of the stored range `[start, start + count)`
    pub fn hash_range(&self, start: usize, count: usize) -> Result<u64> {
        let mut values = vec![0i64; count];
        self.get_many(start, &mut values)?;
        Ok(codec::hash_values(&values))
    }

    pub fn persist(&mut self) -> Result<()> {
        self.store.persist()
    }

    pub fn copy_as(&self, name: &str) -> Result<Self> {
        Ok(Self {
            store: self.store.copy_as(name)?,
            width: self.width,
            tuning: self.tuning,
        })
    }

    pub fn close(self) -> Result<()> {
        self.store.close()
    }

    pub fn close_and_delete(self) -> Result<()> {
        self.store.close_and_delete()
    }

    pub fn sanity_check(&self) -> Result<()> {
        validate_width(self.width)?;
        let stored = self.store.param(WIDTH_PARAM)?;
        if stored != self.width as i64 {
            return Err(Error::Corruption(format!(
                "{}: width param {} but array width {}",
                self.name(),
                stored,
                self.width
            )));
        }
        if self.store.len() % self.width != 0 {
            return Err(Error::Corruption(format!(
                "{}: byte length {} not a multiple of width {}",
                self.name(),
                self.store.len(),
                self.width
            )));
        }
        Ok(())
    }

    pub fn stats(&self) -> VarArrayStats {
        VarArrayStats {
            name: self.name().to_string(),
            kind: self.kind(),
            width: self.width,
            len: self.len(),
            capacity: self.capacity(),
            bytes: self.store.len(),
        }
    }

    pub(crate) fn store_mut(&mut self) -> &mut dyn ByteStore {
        self.store.as_mut()
    }

    /// Re-encode every var at `new_width`, chunk by chunk.
    ///
    /// Growing walks back to front so no unread var is overwritten; shrinking
    /// walks front to back and drops high bytes without checking them.
    pub(crate) fn change_width(&mut self, new_width: usize) -> Result<()> {
        validate_width(new_width)?;
        let old_width = self.width;
        if new_width == old_width {
            return Ok(());
        }
        let len = self.len();
        let chunk = self.tuning.resize_chunk.max(1);
        let mut scratch = vec![0u8; chunk.min(len) * old_width];

        if new_width > old_width {
            self.store.set_len(len * new_width)?;
            let mut end = len;
            while end > 0 {
                let start = end.saturating_sub(chunk);
                let src = &mut scratch[..(end - start) * old_width];
                src.copy_from_slice(&self.store.as_slice()[start * old_width..end * old_width]);
                let dst = &mut self.store.as_mut_slice()[start * new_width..end * new_width];
                codec::transcode(src, old_width, dst, new_width);
                end = start;
            }
        } else {
            let mut start = 0;
            while start < len {
                let end = (start + chunk).min(len);
                let src = &mut scratch[..(end - start) * old_width];
                src.copy_from_slice(&self.store.as_slice()[start * old_width..end * old_width]);
                let dst = &mut self.store.as_mut_slice()[start * new_width..end * new_width];
                codec::transcode(src, old_width, dst, new_width);
                start = end;
            }
            self.store.set_len(len * new_width)?;
        }

        self.width = new_width;
        self.store.set_param(WIDTH_PARAM, new_width as i64)?;
        debug!(
            name = self.name(),
            from = old_width,
            to = new_width,
            len,
            "Changed var width"
        );
        Ok(())
    }

    fn encode_at(&mut self, start: usize, values: &[i64]) {
        let width = self.width;
        let bytes = &mut self.store.as_mut_slice()[start * width..(start + values.len()) * width];
        for (value, slot) in values.iter().zip(bytes.chunks_exact_mut(width)) {
            codec::encode(*value, slot);
        }
    }

    fn fill_unchecked(&mut self, start: usize, count: usize, value: i64) {
        let width = self.width;
        let mut encoded = [0u8; MAX_WIDTH];
        codec::encode(value, &mut encoded[..width]);
        let bytes = &mut self.store.as_mut_slice()[start * width..(start + count) * width];
        for slot in bytes.chunks_exact_mut(width) {
            slot.copy_from_slice(&encoded[..width]);
        }
    }

    /// Bytes taken by `vars` vars at the current width
    fn byte_len(&self, vars: usize) -> Result<usize> {
        vars.checked_mul(self.width).ok_or_else(|| self.overflow(vars))
    }

    fn overflow(&self, vars: usize) -> Error {
        Error::OutOfBounds(format!(
            "{}: {} vars of width {} overflow the address space",
            self.name(),
            vars,
            self.width
        ))
    }

    fn check_range(&self, start: usize, count: usize) -> Result<()> {
        let len = self.len();
        match start.checked_add(count) {
            Some(end) if end <= len => Ok(()),
            _ => Err(Error::OutOfBounds(format!(
                "{}: vars [{}, +{}) outside length {}",
                self.name(),
                start,
                count,
                len
            ))),
        }
    }
}

pub(crate) fn validate_width(width: usize) -> Result<()> {
    if !(MIN_WIDTH..=MAX_WIDTH).contains(&width) {
        return Err(Error::InvalidConfig(format!(
            "var width {} outside [1, 8]",
            width
        )));
    }
    Ok(())
}
