//! Chain pools: conservation, ordering, link reuse

use tempfile::TempDir;
use varstore::error::{Error, Result};
use varstore::storage::dangerous::DangerousChainAllocator;
use varstore::{ChainAllocator, LinkedRecordStore, StoreConfig};

/// Sum of all chain counts plus the free count equals the pool size, and
/// every chain walks back to its head in exactly `len` steps.
fn assert_conserved(pool: &ChainAllocator) -> Result<()> {
    let mut total = pool.free_count()?;
    for chain in 0..pool.chain_count() {
        let len = pool.len(chain)?;
        total += len;
        let links: Vec<usize> = pool.links(chain)?.collect::<Result<_>>()?;
        assert_eq!(links.len(), len);
        if let Some(head) = pool.head(chain)? {
            assert_eq!(pool.nth_after(head, len)?, head);
        }
    }
    assert_eq!(total, pool.link_slots());
    assert_eq!(pool.links_in_use()?, pool.link_slots() - pool.free_count()?);
    pool.sanity_check()
}

#[test]
fn test_conservation_under_mixed_operations() -> Result<()> {
    let mut pool = ChainAllocator::in_memory("mixed")?;
    // deterministic pseudo-random walk over 7 chains
    let mut state: u64 = 0x9e37_79b9;
    for step in 0..2_000 {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let chain = ((state >> 33) % 7) as usize;
        match (state >> 40) % 5 {
            0 | 1 => {
                pool.append(chain)?;
            }
            2 => {
                pool.prepend(chain)?;
            }
            3 => {
                if !pool.is_empty(chain)? {
                    pool.remove_first(chain)?;
                }
            }
            _ => {
                if let Some(head) = pool.head(chain)? {
                    if pool.len(chain)? > 1 {
                        pool.remove_after(chain, head)?;
                    } else {
                        pool.insert_after(chain, head)?;
                    }
                }
            }
        }
        if step % 97 == 0 {
            assert_conserved(&pool)?;
        }
    }
    assert_conserved(&pool)?;

    for chain in 0..pool.chain_count() {
        pool.remove_all(chain)?;
    }
    assert_eq!(pool.links_in_use()?, 0);
    assert_conserved(&pool)
}

#[test]
fn test_freed_link_is_reused_by_any_chain() -> Result<()> {
    let mut lists = LinkedRecordStore::in_memory("letters")?;
    lists.ensure_chain_count(3)?;
    for c in ['a', 'b', 'c'] {
        lists.append(1, c as i64)?;
    }
    assert_eq!(lists.values(1)?, vec!['a' as i64, 'b' as i64, 'c' as i64]);

    let freed = lists.chains().head(1)?;
    assert_eq!(lists.remove_first(1)?, 'a' as i64);
    assert_eq!(lists.values(1)?, vec!['b' as i64, 'c' as i64]);

    let reused = lists.append(2, 'd' as i64)?;
    assert_eq!(Some(reused), freed);
    assert_eq!(lists.chains().link_slots(), 3);
    lists.sanity_check()
}

#[test]
fn test_append_keeps_order_and_prepend_reverses() -> Result<()> {
    let mut lists = LinkedRecordStore::in_memory("order")?;
    for v in 0..10 {
        lists.append(0, v)?;
        lists.prepend(1, v)?;
    }
    let forward: Vec<i64> = (0..10).collect();
    let backward: Vec<i64> = (0..10).rev().collect();
    assert_eq!(lists.values(0)?, forward);
    assert_eq!(lists.values(1)?, backward);

    lists.remove_first(0)?;
    assert_eq!(lists.values(0)?, forward[1..].to_vec());
    Ok(())
}

#[test]
fn test_remove_from_empty_chain_fails() -> Result<()> {
    let mut pool = ChainAllocator::in_memory("empty")?;
    assert!(matches!(pool.remove_first(4), Err(Error::OutOfBounds(_))));
    assert!(!pool.remove_all(4)?);
    Ok(())
}

#[test]
fn test_large_pool_widens_next_pointers() -> Result<()> {
    let mut lists = LinkedRecordStore::in_memory("wide")?;
    for v in 0..300 {
        lists.append((v % 3) as usize, v)?;
    }
    let stats = lists.stats()?;
    assert_eq!(stats.chains.link_slots, 300);
    assert_eq!(stats.chains.longest_chain, 100);
    assert_eq!(stats.chains.next_width, 2);
    assert_eq!(lists.get(2, 99)?, 299);
    lists.sanity_check()
}

/// 10 chains of 5 links, appended round-robin
fn striped_pool(config: &StoreConfig) -> Result<ChainAllocator> {
    let mut pool = ChainAllocator::create("striped", config)?;
    for _ in 0..5 {
        for chain in 0..10 {
            pool.append(chain)?;
        }
    }
    Ok(pool)
}

#[test]
fn test_mmap_sanity_scans_only_the_tail_window() -> Result<()> {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = StoreConfig::mmap(dir.path().join("mmap"));
    config.sanity_window = 4;
    let mut pool = striped_pool(&config)?;
    pool.sanity_check()?;

    // chain 0 sits before the last 4 chains
    pool.raw_counts().set(1, 9)?;
    pool.sanity_check()?;
    pool.raw_counts().set(1, 5)?;

    // chain 9 is inside the window
    pool.raw_counts().set(10, 9)?;
    assert!(matches!(pool.sanity_check(), Err(Error::Corruption(_))));
    pool.raw_counts().set(10, 5)?;
    pool.sanity_check()?;

    // so is the last link
    pool.raw_next().set(49, 999)?;
    assert!(matches!(pool.sanity_check(), Err(Error::Corruption(_))));
    pool.close_and_delete()
}

#[test]
fn test_heap_sanity_scans_everything() -> Result<()> {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = StoreConfig::heap(dir.path());
    config.sanity_window = 4;
    let mut pool = striped_pool(&config)?;
    pool.sanity_check()?;

    pool.raw_counts().set(1, 9)?;
    assert!(matches!(pool.sanity_check(), Err(Error::Corruption(_))));
    pool.raw_counts().set(1, 5)?;

    pool.raw_next().set(0, 999)?;
    assert!(matches!(pool.sanity_check(), Err(Error::Corruption(_))));
    Ok(())
}
