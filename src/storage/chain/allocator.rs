//! Chain allocator implementation

use crate::config::{self, StoreConfig};
use crate::error::{Error, Result};
use crate::storage::backing::{resource_name, BackingKind};
use crate::storage::stats::ChainStats;
use crate::storage::var::VarArray;
use crate::NOT_FOUND;
use tracing::{debug, info, warn};

pub const NEXT_SUFFIX: &str = "Next";
pub const LAST_SUFFIX: &str = "Last";
pub const COUNT_SUFFIX: &str = "N";

/// Slot of the free chain in the last/count arrays
const FREE: usize = 0;

/// Many circular singly-linked lists over one pool of link slots
///
/// Per chain only the tail is stored; the head is `next[tail]`. Chain `c`
/// lives at slot `c + 1` of the tail and count arrays, slot 0 being the free
/// chain of recycled links.
#[derive(Debug)]
pub struct ChainAllocator {
    name: String,
    next: VarArray,
    last: VarArray,
    counts: VarArray,
}

impl ChainAllocator {
    /// Create an empty pool backed by `name.Next`, `name.Last`, `name.N`
    pub fn create(name: &str, config: &StoreConfig) -> Result<Self> {
        let next = VarArray::create(&resource_name(name, NEXT_SUFFIX), config)?;
        let mut last = VarArray::create(&resource_name(name, LAST_SUFFIX), config)?;
        let mut counts = VarArray::create(&resource_name(name, COUNT_SUFFIX), config)?;
        last.push(NOT_FOUND)?;
        counts.push(0)?;
        debug!(name, "Created chain allocator");
        Ok(Self {
            name: name.to_string(),
            next,
            last,
            counts,
        })
    }

    pub fn open(name: &str, config: &StoreConfig) -> Result<Self> {
        let next = VarArray::open(&resource_name(name, NEXT_SUFFIX), config)?;
        let last = VarArray::open(&resource_name(name, LAST_SUFFIX), config)?;
        let counts = VarArray::open(&resource_name(name, COUNT_SUFFIX), config)?;
        Self::wrap(name, next, last, counts)
    }

    /// Adopt next/last/count arrays built elsewhere
    pub fn wrap(name: &str, next: VarArray, last: VarArray, counts: VarArray) -> Result<Self> {
        if last.is_empty() || last.len() != counts.len() {
            return Err(Error::InvalidConfig(format!(
                "{}: tail array has {} entries, count array {}",
                name,
                last.len(),
                counts.len()
            )));
        }
        Ok(Self {
            name: name.to_string(),
            next,
            last,
            counts,
        })
    }

    pub fn in_memory(name: &str) -> Result<Self> {
        Self::create(name, &StoreConfig::in_memory())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BackingKind {
        self.next.kind()
    }

    /// Number of user chains (the free chain not included)
    pub fn chain_count(&self) -> usize {
        self.last.len() - 1
    }

    /// Make chains `[0, chains)` addressable
    pub fn ensure_chain_count(&mut self, chains: usize) -> Result<()> {
        let current = self.chain_count();
        if chains > current {
            self.last.push_repeated(NOT_FOUND, chains - current)?;
            self.counts.push_repeated(0, chains - current)?;
        }
        Ok(())
    }

    /// Total link slots, used or free
    pub fn link_slots(&self) -> usize {
        self.next.len()
    }

    pub fn free_count(&self) -> Result<usize> {
        Ok(self.count_of(FREE)? as usize)
    }

    pub fn links_in_use(&self) -> Result<usize> {
        Ok(self.link_slots() - self.free_count()?)
    }

    /// Links in `chain`; chains never touched are empty
    pub fn len(&self, chain: usize) -> Result<usize> {
        if chain >= self.chain_count() {
            return Ok(0);
        }
        Ok(self.count_of(slot(chain)?)? as usize)
    }

    pub fn is_empty(&self, chain: usize) -> Result<bool> {
        Ok(self.len(chain)? == 0)
    }

    pub fn tail(&self, chain: usize) -> Result<Option<usize>> {
        if chain >= self.chain_count() {
            return Ok(None);
        }
        self.last_of(slot(chain)?)
    }

    pub fn head(&self, chain: usize) -> Result<Option<usize>> {
        match self.tail(chain)? {
            Some(tail) => Ok(Some(self.next_link(tail)?)),
            None => Ok(None),
        }
    }

    /// Successor of `link` (the head, for a tail)
    pub fn next_link(&self, link: usize) -> Result<usize> {
        self.check_link(link)?;
        Ok(self.next.get(link)? as usize)
    }

    /// Allocate a link at the front of `chain`
    pub fn prepend(&mut self, chain: usize) -> Result<usize> {
        let link = self.new_link_for(chain)?;
        let s = slot(chain)?;
        match self.last_of(s)? {
            None => {
                self.set_last(s, Some(link))?;
                self.next.set(link, link as i64)?;
            }
            Some(tail) => {
                let head = self.next_link(tail)?;
                self.next.set(link, head as i64)?;
                self.next.set(tail, link as i64)?;
            }
        }
        Ok(link)
    }

    /// Allocate a link at the end of `chain`
    pub fn append(&mut self, chain: usize) -> Result<usize> {
        let link = self.prepend(chain)?;
        self.set_last(slot(chain)?, Some(link))?;
        Ok(link)
    }

    /// Allocate a link right after `after`, which must belong to `chain`
    pub fn insert_after(&mut self, chain: usize, after: usize) -> Result<usize> {
        if self.is_empty(chain)? {
            return Err(Error::OutOfBounds(format!(
                "{}: insert after link {} in empty chain {}",
                self.name, after, chain
            )));
        }
        self.check_link(after)?;
        if config::range_checking() {
            self.check_member(chain, after)?;
        }
        let link = self.new_link_for(chain)?;
        let following = self.next_link(after)?;
        self.next.set(link, following as i64)?;
        self.next.set(after, link as i64)?;
        let s = slot(chain)?;
        if self.last_of(s)? == Some(after) {
            self.set_last(s, Some(link))?;
        }
        Ok(link)
    }

    /// Unlink `link` from `chain` given its predecessor `prev`, and recycle
    /// it onto the free chain. For a single-link chain `prev == link`.
    pub fn remove_at(&mut self, chain: usize, prev: usize, link: usize) -> Result<()> {
        let count = self.len(chain)?;
        if count == 0 {
            return Err(Error::OutOfBounds(format!(
                "{}: remove from empty chain {}",
                self.name, chain
            )));
        }
        if self.next_link(prev)? != link {
            return Err(Error::OutOfBounds(format!(
                "{}: link {} does not follow {}",
                self.name, link, prev
            )));
        }
        let s = slot(chain)?;
        self.counts.add_to(s, -1)?;
        if prev == link {
            self.set_last(s, None)?;
        } else {
            let following = self.next_link(link)?;
            self.next.set(prev, following as i64)?;
            if self.last_of(s)? == Some(link) {
                self.set_last(s, Some(prev))?;
            }
        }
        self.push_free(link)
    }

    /// Remove the head of `chain`, returning the recycled link
    pub fn remove_first(&mut self, chain: usize) -> Result<usize> {
        let tail = self.tail(chain)?.ok_or_else(|| {
            Error::OutOfBounds(format!("{}: chain {} is empty", self.name, chain))
        })?;
        let head = self.next_link(tail)?;
        self.remove_at(chain, tail, head)?;
        Ok(head)
    }

    /// Remove the successor of `link`, returning the recycled link
    pub fn remove_after(&mut self, chain: usize, link: usize) -> Result<usize> {
        if config::range_checking() {
            self.check_member(chain, link)?;
        }
        let target = self.next_link(link)?;
        self.remove_at(chain, link, target)?;
        Ok(target)
    }

    /// Move every link of `chain` onto the free chain in one splice.
    /// Returns whether anything was removed.
    pub fn remove_all(&mut self, chain: usize) -> Result<bool> {
        let count = self.len(chain)?;
        let Some(tail) = self.tail(chain)? else {
            return Ok(false);
        };
        let s = slot(chain)?;
        match self.last_of(FREE)? {
            None => {}
            Some(free_tail) => {
                let free_head = self.next_link(free_tail)?;
                let head = self.next_link(tail)?;
                self.next.set(free_tail, head as i64)?;
                self.next.set(tail, free_head as i64)?;
            }
        }
        self.set_last(FREE, Some(tail))?;
        self.counts.add_to(FREE, count as i64)?;
        self.counts.set(s, 0)?;
        self.set_last(s, None)?;
        Ok(true)
    }

    /// The `n`-th link of `chain` from the head. O(n).
    pub fn nth_link(&self, chain: usize, n: usize) -> Result<usize> {
        let len = self.len(chain)?;
        if n >= len {
            return Err(Error::OutOfBounds(format!(
                "{}: position {} in chain {} of length {}",
                self.name, n, chain, len
            )));
        }
        let head = self.head(chain)?.ok_or_else(|| {
            Error::Corruption(format!("{}: chain {} has count but no tail", self.name, chain))
        })?;
        self.nth_after(head, n)
    }

    /// Follow `n` next pointers from `link`. O(n).
    pub fn nth_after(&self, link: usize, n: usize) -> Result<usize> {
        let mut current = link;
        for _ in 0..n {
            current = self.next_link(current)?;
        }
        Ok(current)
    }

    /// Links of `chain` head to tail
    pub fn links(&self, chain: usize) -> Result<ChainLinks<'_>> {
        Ok(ChainLinks {
            allocator: self,
            current: self.head(chain)?,
            remaining: self.len(chain)?,
        })
    }

    /// Drop every chain and link
    pub fn clear(&mut self) -> Result<()> {
        self.next.clear()?;
        self.last.clear()?;
        self.counts.clear()?;
        self.last.push(NOT_FOUND)?;
        self.counts.push(0)?;
        Ok(())
    }

    pub fn compact(&mut self) -> Result<()> {
        self.next.compact()?;
        self.last.compact()?;
        self.counts.compact()
    }

    /// Verify array shapes, next-pointer bounds and cycle lengths.
    ///
    /// Heap pools (or any pool with range checking on) are checked in full,
    /// including link conservation. Mmap pools only check the tail window of
    /// links and chains.
    pub fn sanity_check(&self) -> Result<()> {
        self.next.sanity_check()?;
        self.last.sanity_check()?;
        self.counts.sanity_check()?;
        if self.last.is_empty() || self.last.len() != self.counts.len() {
            return Err(self.corruption(format!(
                "tail array has {} entries, count array {}",
                self.last.len(),
                self.counts.len()
            )));
        }

        let full = config::range_checking() || self.kind() == BackingKind::Heap;
        let window = self.next.tuning().sanity_window.max(1);
        let slots = self.link_slots();

        let first_link = if full { 0 } else { slots.saturating_sub(window) };
        for link in first_link..slots {
            let next = self.next.get(link)?;
            if next < 0 || next as usize >= slots {
                return Err(self.corruption(format!(
                    "link {} points to {} outside {} slots",
                    link, next, slots
                )));
            }
        }

        let chain_slots = self.last.len();
        let first_slot = if full { 1 } else { chain_slots.saturating_sub(window).max(1) };
        self.check_cycle(FREE)?;
        for s in first_slot..chain_slots {
            self.check_cycle(s)?;
        }

        if full {
            let mut total = 0i64;
            for s in 0..chain_slots {
                total += self.count_of(s)?;
            }
            if total != slots as i64 {
                return Err(self.corruption(format!(
                    "chain counts sum to {} but pool has {} slots",
                    total, slots
                )));
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<ChainStats> {
        let mut longest = 0;
        for s in 1..self.counts.len() {
            longest = longest.max(self.count_of(s)? as usize);
        }
        Ok(ChainStats {
            chains: self.chain_count(),
            link_slots: self.link_slots(),
            links_in_use: self.links_in_use()?,
            free_links: self.free_count()?,
            longest_chain: longest,
            next_width: self.next.width(),
        })
    }

    pub fn persist(&mut self) -> Result<()> {
        self.next.persist()?;
        self.last.persist()?;
        self.counts.persist()
    }

    pub fn copy_as(&self, name: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            next: self.next.copy_as(&resource_name(name, NEXT_SUFFIX))?,
            last: self.last.copy_as(&resource_name(name, LAST_SUFFIX))?,
            counts: self.counts.copy_as(&resource_name(name, COUNT_SUFFIX))?,
        })
    }

    pub fn close(self) -> Result<()> {
        self.next.close()?;
        self.last.close()?;
        self.counts.close()
    }

    pub fn close_and_delete(self) -> Result<()> {
        let name = self.name;
        self.next.close_and_delete()?;
        self.last.close_and_delete()?;
        self.counts.close_and_delete()?;
        info!(name = %name, "Deleted chain allocator");
        Ok(())
    }

    pub(crate) fn next_mut(&mut self) -> &mut VarArray {
        &mut self.next
    }

    pub(crate) fn last_mut(&mut self) -> &mut VarArray {
        &mut self.last
    }

    pub(crate) fn counts_mut(&mut self) -> &mut VarArray {
        &mut self.counts
    }

    /// Count `chain` in and hand out a link, recycled or new
    fn new_link_for(&mut self, chain: usize) -> Result<usize> {
        let s = slot(chain)?;
        self.ensure_chain_count(s)?;
        self.counts.add_to(s, 1)?;
        self.new_link()
    }

    /// Pop the head of the free chain, or grow the pool by one slot
    fn new_link(&mut self) -> Result<usize> {
        let Some(free_tail) = self.last_of(FREE)? else {
            let link = self.next.len();
            self.next.push(link as i64)?;
            return Ok(link);
        };
        let head = self.next_link(free_tail)?;
        if head == free_tail {
            self.set_last(FREE, None)?;
        } else {
            let following = self.next_link(head)?;
            self.next.set(free_tail, following as i64)?;
        }
        self.counts.add_to(FREE, -1)?;
        Ok(head)
    }

    /// Append `link` to the free chain
    fn push_free(&mut self, link: usize) -> Result<()> {
        self.counts.add_to(FREE, 1)?;
        match self.last_of(FREE)? {
            None => {
                self.next.set(link, link as i64)?;
            }
            Some(free_tail) => {
                let free_head = self.next_link(free_tail)?;
                self.next.set(link, free_head as i64)?;
                self.next.set(free_tail, link as i64)?;
            }
        }
        self.set_last(FREE, Some(link))
    }

    fn last_of(&self, s: usize) -> Result<Option<usize>> {
        let tail = self.last.get(s)?;
        Ok(if tail == NOT_FOUND {
            None
        } else {
            Some(tail as usize)
        })
    }

    fn set_last(&mut self, s: usize, link: Option<usize>) -> Result<()> {
        self.last
            .set(s, link.map(|l| l as i64).unwrap_or(NOT_FOUND))
    }

    fn count_of(&self, s: usize) -> Result<i64> {
        self.counts.get(s)
    }

    fn check_link(&self, link: usize) -> Result<()> {
        if link >= self.link_slots() {
            return Err(Error::OutOfBounds(format!(
                "{}: link {} outside {} slots",
                self.name,
                link,
                self.link_slots()
            )));
        }
        Ok(())
    }

    fn check_member(&self, chain: usize, link: usize) -> Result<()> {
        for member in self.links(chain)? {
            if member? == link {
                return Ok(());
            }
        }
        Err(Error::OutOfBounds(format!(
            "{}: link {} is not in chain {}",
            self.name, link, chain
        )))
    }

    /// Walking `count` steps from the head returns to the head, and not sooner
    fn check_cycle(&self, s: usize) -> Result<()> {
        let count = self.count_of(s)?;
        let tail = self.last_of(s)?;
        if count < 0 {
            return Err(self.corruption(format!("slot {} has negative count {}", s, count)));
        }
        let tail = match (count, tail) {
            (0, None) => return Ok(()),
            (0, Some(t)) => {
                return Err(self.corruption(format!("slot {} is empty but has tail {}", s, t)))
            }
            (_, None) => {
                return Err(self.corruption(format!("slot {} has count {} but no tail", s, count)))
            }
            (_, Some(t)) => t,
        };
        if tail >= self.link_slots() {
            return Err(self.corruption(format!("slot {} tail {} out of range", s, tail)));
        }
        let head = self.next_link(tail)?;
        let mut current = head;
        for step in 1..=count {
            current = self.next_link(current)?;
            if current == head && step < count {
                return Err(self.corruption(format!(
                    "slot {} closes after {} links, count says {}",
                    s, step, count
                )));
            }
        }
        if current != head {
            return Err(self.corruption(format!(
                "slot {} does not close after {} links",
                s, count
            )));
        }
        Ok(())
    }

    fn corruption(&self, detail: String) -> Error {
        warn!(name = %self.name, detail = %detail, "Chain sanity check failed");
        Error::Corruption(format!("{}: {}", self.name, detail))
    }
}

/// Slot of user chain `chain` in the last/count arrays
#[inline]
fn slot(chain: usize) -> Result<usize> {
    chain
        .checked_add(1)
        .ok_or_else(|| Error::OutOfBounds(format!("chain id {} overflows", chain)))
}

/// Iterator over the links of one chain, head to tail
pub struct ChainLinks<'a> {
    allocator: &'a ChainAllocator,
    current: Option<usize>,
    remaining: usize,
}

impl Iterator for ChainLinks<'_> {
    type Item = Result<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let link = self.current?;
        self.remaining -= 1;
        if self.remaining > 0 {
            match self.allocator.next_link(link) {
                Ok(next) => self.current = Some(next),
                Err(e) => {
                    self.remaining = 0;
                    return Some(Err(e));
                }
            }
        }
        Some(Ok(link))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
