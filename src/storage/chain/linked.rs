//! Linked record store: one growable list of vars per chain

use super::allocator::{ChainAllocator, ChainLinks};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::storage::backing::BackingKind;
use crate::storage::data::VarRecordStore;
use crate::storage::stats::LinkedStoreStats;
use crate::storage::var::VarArray;
use tracing::{debug, info, warn};

/// Per-chain lists of packed integers sharing one link pool.
///
/// `values[link]` holds the value of each link, so the value array is always
/// as long as the pool. Freed links keep stale values until reused.
#[derive(Debug)]
pub struct LinkedRecordStore {
    chains: ChainAllocator,
    values: VarArray,
}

impl LinkedRecordStore {
    /// Create an empty store: values in `name`, links in `name.Next|Last|N`
    pub fn create(name: &str, config: &StoreConfig) -> Result<Self> {
        let values = VarArray::create(name, config)?;
        let chains = ChainAllocator::create(name, config)?;
        info!(name, backing = %config.backing, "Created linked record store");
        Ok(Self { chains, values })
    }

    pub fn open(name: &str, config: &StoreConfig) -> Result<Self> {
        let values = VarArray::open(name, config)?;
        let chains = ChainAllocator::open(name, config)?;
        let store = Self::wrap(chains, values)?;
        info!(name, chains = store.chain_count(), "Opened linked record store");
        Ok(store)
    }

    pub fn wrap(chains: ChainAllocator, values: VarArray) -> Result<Self> {
        if values.len() != chains.link_slots() {
            return Err(Error::Corruption(format!(
                "{}: {} values for {} link slots",
                values.name(),
                values.len(),
                chains.link_slots()
            )));
        }
        Ok(Self { chains, values })
    }

    pub fn in_memory(name: &str) -> Result<Self> {
        Self::create(name, &StoreConfig::in_memory())
    }

    /// Build a store with one chain per row of `src`
    pub fn from_record_store(name: &str, config: &StoreConfig, src: &VarRecordStore) -> Result<Self> {
        let mut store = Self::create(name, config)?;
        store.import_from(src)?;
        Ok(store)
    }

    pub fn name(&self) -> &str {
        self.values.name()
    }

    pub fn kind(&self) -> BackingKind {
        self.values.kind()
    }

    pub fn chain_count(&self) -> usize {
        self.chains.chain_count()
    }

    pub fn ensure_chain_count(&mut self, chains: usize) -> Result<()> {
        self.chains.ensure_chain_count(chains)
    }

    pub fn len(&self, chain: usize) -> Result<usize> {
        self.chains.len(chain)
    }

    pub fn is_empty(&self, chain: usize) -> Result<bool> {
        self.chains.is_empty(chain)
    }

    /// Values stored across all chains
    pub fn total_values(&self) -> Result<usize> {
        self.chains.links_in_use()
    }

    /// Link pool behind the store
    pub fn chains(&self) -> &ChainAllocator {
        &self.chains
    }

    pub fn append(&mut self, chain: usize, value: i64) -> Result<usize> {
        let link = self.chains.append(chain)?;
        self.store_value(link, value)?;
        Ok(link)
    }

    pub fn prepend(&mut self, chain: usize, value: i64) -> Result<usize> {
        let link = self.chains.prepend(chain)?;
        self.store_value(link, value)?;
        Ok(link)
    }

    /// Insert `value` after the link `after` of `chain`
    pub fn insert_after(&mut self, chain: usize, after: usize, value: i64) -> Result<usize> {
        let link = self.chains.insert_after(chain, after)?;
        self.store_value(link, value)?;
        Ok(link)
    }

    /// Append `value` unless the chain already holds it. O(len).
    pub fn append_unique(&mut self, chain: usize, value: i64) -> Result<bool> {
        if self.contains(chain, value)? {
            return Ok(false);
        }
        self.append(chain, value)?;
        Ok(true)
    }

    pub fn contains(&self, chain: usize, value: i64) -> Result<bool> {
        Ok(self.index_of(chain, value)?.is_some())
    }

    /// Position of the first occurrence of `value` in `chain`
    pub fn index_of(&self, chain: usize, value: i64) -> Result<Option<usize>> {
        for (position, link) in self.chains.links(chain)?.enumerate() {
            if self.values.get(link?)? == value {
                return Ok(Some(position));
            }
        }
        Ok(None)
    }

    pub fn first(&self, chain: usize) -> Result<Option<i64>> {
        match self.chains.head(chain)? {
            Some(link) => Ok(Some(self.values.get(link)?)),
            None => Ok(None),
        }
    }

    pub fn last(&self, chain: usize) -> Result<Option<i64>> {
        match self.chains.tail(chain)? {
            Some(link) => Ok(Some(self.values.get(link)?)),
            None => Ok(None),
        }
    }

    /// The `n`-th value of `chain`. O(n).
    pub fn get(&self, chain: usize, n: usize) -> Result<i64> {
        let link = self.chains.nth_link(chain, n)?;
        self.values.get(link)
    }

    /// Overwrite the `n`-th value of `chain`. O(n).
    pub fn set(&mut self, chain: usize, n: usize, value: i64) -> Result<()> {
        let link = self.chains.nth_link(chain, n)?;
        self.values.set(link, value)
    }

    pub fn value_at(&self, link: usize) -> Result<i64> {
        self.values.get(link)
    }

    pub fn set_value_at(&mut self, link: usize, value: i64) -> Result<()> {
        self.values.set(link, value)
    }

    pub fn links(&self, chain: usize) -> Result<ChainLinks<'_>> {
        self.chains.links(chain)
    }

    /// Values of `chain` head to tail
    pub fn iter(&self, chain: usize) -> Result<impl Iterator<Item = Result<i64>> + '_> {
        let values = &self.values;
        Ok(self
            .chains
            .links(chain)?
            .map(move |link| link.and_then(|l| values.get(l))))
    }

    /// Materialize `chain` into a vector
    pub fn values(&self, chain: usize) -> Result<Vec<i64>> {
        self.iter(chain)?.collect()
    }

    /// Remove and return the head value of `chain`
    pub fn remove_first(&mut self, chain: usize) -> Result<i64> {
        let link = self.chains.remove_first(chain)?;
        self.values.get(link)
    }

    /// Remove the first occurrence of `value`. Returns whether one was found.
    pub fn remove_value(&mut self, chain: usize, value: i64) -> Result<bool> {
        let Some(tail) = self.chains.tail(chain)? else {
            return Ok(false);
        };
        let mut prev = tail;
        for _ in 0..self.chains.len(chain)? {
            let link = self.chains.next_link(prev)?;
            if self.values.get(link)? == value {
                self.chains.remove_at(chain, prev, link)?;
                return Ok(true);
            }
            prev = link;
        }
        Ok(false)
    }

    pub fn remove_all(&mut self, chain: usize) -> Result<bool> {
        self.chains.remove_all(chain)
    }

    /// Append every chain as one row of `dst`, chain `c` becoming the next
    /// row in order
    pub fn export_to(&self, dst: &mut VarRecordStore) -> Result<()> {
        dst.ensure_capacity(dst.len() + self.chain_count(), dst.payload_len() + self.total_values()?)?;
        let mut row = Vec::new();
        for chain in 0..self.chain_count() {
            row.clear();
            for value in self.iter(chain)? {
                row.push(value?);
            }
            dst.push(&row)?;
        }
        debug!(name = self.name(), chains = self.chain_count(), dst = dst.name(), "Exported chains");
        Ok(())
    }

    /// Flatten into a new var record store named `name`
    pub fn to_record_store(&self, name: &str, config: &StoreConfig) -> Result<VarRecordStore> {
        let mut dst = VarRecordStore::create(name, config)?;
        self.export_to(&mut dst)?;
        Ok(dst)
    }

    /// Append row `i` of `src` to chain `i`
    pub fn import_from(&mut self, src: &VarRecordStore) -> Result<()> {
        self.ensure_chain_count(src.len())?;
        let mut row = Vec::new();
        for index in 0..src.len() {
            src.get_into(index, &mut row)?;
            for value in &row {
                self.append(index, *value)?;
            }
        }
        debug!(name = self.name(), rows = src.len(), src = src.name(), "Imported rows");
        Ok(())
    }

    /// Chains share a pool whose layout depends on removal history, so there
    /// is no stable whole-store hash.
    pub fn hash(&self) -> Result<u64> {
        Err(Error::Unsupported(format!(
            "{}: linked record stores cannot be hashed",
            self.name()
        )))
    }

    pub fn clear(&mut self) -> Result<()> {
        self.chains.clear()?;
        self.values.clear()
    }

    pub fn compact(&mut self) -> Result<()> {
        self.chains.compact()?;
        self.values.compact()
    }

    pub fn sanity_check(&self) -> Result<()> {
        self.values.sanity_check()?;
        self.chains.sanity_check()?;
        if self.values.len() != self.chains.link_slots() {
            warn!(name = self.name(), "Value array out of step with link pool");
            return Err(Error::Corruption(format!(
                "{}: {} values for {} link slots",
                self.name(),
                self.values.len(),
                self.chains.link_slots()
            )));
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<LinkedStoreStats> {
        Ok(LinkedStoreStats {
            name: self.name().to_string(),
            chains: self.chains.stats()?,
            values: self.values.stats(),
        })
    }

    pub fn persist(&mut self) -> Result<()> {
        self.values.persist()?;
        self.chains.persist()?;
        debug!(name = self.name(), chains = self.chain_count(), "Persisted linked record store");
        Ok(())
    }

    pub fn copy_as(&self, name: &str) -> Result<Self> {
        Ok(Self {
            chains: self.chains.copy_as(name)?,
            values: self.values.copy_as(name)?,
        })
    }

    pub fn close(self) -> Result<()> {
        self.values.close()?;
        self.chains.close()
    }

    pub fn close_and_delete(self) -> Result<()> {
        self.values.close_and_delete()?;
        self.chains.close_and_delete()
    }

    pub(crate) fn chains_mut(&mut self) -> &mut ChainAllocator {
        &mut self.chains
    }

    pub(crate) fn values_mut(&mut self) -> &mut VarArray {
        &mut self.values
    }

    fn store_value(&mut self, link: usize, value: i64) -> Result<()> {
        if link >= self.values.len() {
            self.values.set_len(link + 1)?;
        }
        self.values.set(link, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chains_keep_insertion_order() -> Result<()> {
        let mut lists = LinkedRecordStore::in_memory("lists")?;
        lists.append(0, 10)?;
        lists.append(1, 7)?;
        lists.append(0, 11)?;
        lists.prepend(0, 9)?;
        assert_eq!(lists.values(0)?, vec![9, 10, 11]);
        assert_eq!(lists.values(1)?, vec![7]);
        assert_eq!(lists.first(0)?, Some(9));
        assert_eq!(lists.last(0)?, Some(11));
        assert_eq!(lists.get(0, 1)?, 10);
        lists.sanity_check()?;
        Ok(())
    }

    #[test]
    fn test_append_unique() -> Result<()> {
        let mut lists = LinkedRecordStore::in_memory("lists")?;
        assert!(lists.append_unique(3, 5)?);
        assert!(!lists.append_unique(3, 5)?);
        assert!(lists.append_unique(3, 6)?);
        assert_eq!(lists.values(3)?, vec![5, 6]);
        assert_eq!(lists.index_of(3, 6)?, Some(1));
        assert!(lists.contains(3, 5)?);
        assert!(!lists.contains(2, 5)?);
        Ok(())
    }

    #[test]
    fn test_remove_value_and_reuse() -> Result<()> {
        let mut lists = LinkedRecordStore::in_memory("lists")?;
        for v in [1, 2, 3] {
            lists.append(0, v)?;
        }
        assert!(lists.remove_value(0, 3)?);
        assert!(!lists.remove_value(0, 42)?);
        assert_eq!(lists.values(0)?, vec![1, 2]);
        assert_eq!(lists.last(0)?, Some(2));

        lists.append(1, 300)?;
        assert_eq!(lists.chains().link_slots(), 3);
        assert_eq!(lists.values(1)?, vec![300]);
        lists.sanity_check()?;
        Ok(())
    }

    #[test]
    fn test_set_and_insert_after() -> Result<()> {
        let mut lists = LinkedRecordStore::in_memory("lists")?;
        let a = lists.append(0, 1)?;
        lists.append(0, 3)?;
        lists.insert_after(0, a, 2)?;
        lists.set(0, 2, -3)?;
        assert_eq!(lists.values(0)?, vec![1, 2, -3]);
        assert!(lists.set(0, 3, 0).is_err());
        Ok(())
    }

    #[test]
    fn test_export_and_import() -> Result<()> {
        let mut lists = LinkedRecordStore::in_memory("lists")?;
        lists.append(0, 4)?;
        lists.append(2, 8)?;
        lists.append(0, 5)?;

        let flat = lists.to_record_store("flat", &StoreConfig::in_memory())?;
        assert_eq!(flat.len(), 3);
        assert_eq!(flat.get(0)?, vec![4, 5]);
        assert_eq!(flat.get(1)?, Vec::<i64>::new());
        assert_eq!(flat.get(2)?, vec![8]);

        let back = LinkedRecordStore::from_record_store("back", &StoreConfig::in_memory(), &flat)?;
        assert_eq!(back.chain_count(), 3);
        for chain in 0..3 {
            assert_eq!(back.values(chain)?, lists.values(chain)?);
        }
        Ok(())
    }

    #[test]
    fn test_hash_is_unsupported() -> Result<()> {
        let lists = LinkedRecordStore::in_memory("lists")?;
        assert!(matches!(lists.hash(), Err(Error::Unsupported(_))));
        Ok(())
    }

    #[test]
    fn test_remove_all_then_clear() -> Result<()> {
        let mut lists = LinkedRecordStore::in_memory("lists")?;
        lists.append(0, 1)?;
        lists.append(0, 2)?;
        assert!(lists.remove_all(0)?);
        assert_eq!(lists.total_values()?, 0);
        assert_eq!(lists.first(0)?, None);
        lists.clear()?;
        assert_eq!(lists.chain_count(), 0);
        lists.sanity_check()?;
        Ok(())
    }
}
