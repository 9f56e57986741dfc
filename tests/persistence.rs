//! Persist / reload round trips for every store and backing kind

use tempfile::TempDir;
use varstore::error::Result;
use varstore::storage::{store_exists, CompressionAlgorithm};
use varstore::{ByteRecordStore, LinkedRecordStore, StoreConfig, VarArray, VarRecordStore};

fn configs(dir: &TempDir) -> Vec<StoreConfig> {
    vec![
        StoreConfig::heap(dir.path().join("heap")),
        StoreConfig::heap(dir.path().join("zstd")).with_compression(CompressionAlgorithm::Zstd),
        StoreConfig::mmap(dir.path().join("mmap")),
    ]
}

#[test]
fn test_var_array_round_trip() -> Result<()> {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for config in configs(&dir) {
        let values: Vec<i64> = (0..500).map(|i| i * i - 40_000).collect();
        let mut vars = VarArray::create("numbers", &config)?;
        vars.extend_from_slice(&values)?;
        let width = vars.width();
        vars.persist()?;
        vars.close()?;

        let reopened = VarArray::open("numbers", &config)?;
        assert_eq!(reopened.width(), width, "{:?}", config.backing);
        assert_eq!(reopened.to_vec(), values);
        reopened.sanity_check()?;
    }
    Ok(())
}

#[test]
fn test_record_stores_round_trip() -> Result<()> {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for config in configs(&dir) {
        let mut terms = ByteRecordStore::create("terms", &config)?;
        for term in ["alpha", "", "gamma", "δέλτα"] {
            terms.push_str(term)?;
        }
        terms.persist()?;
        terms.close()?;

        let mut docs = VarRecordStore::create("docs", &config)?;
        docs.push(&[3, 1, 4])?;
        docs.push(&[])?;
        docs.push(&[1 << 40])?;
        docs.persist()?;
        docs.close()?;

        let terms = ByteRecordStore::open("terms", &config)?;
        assert_eq!(terms.len(), 4);
        assert_eq!(terms.payload_len(), "alpha".len() + "gamma".len() + "δέλτα".len());
        assert_eq!(terms.get_str(3)?, "δέλτα");
        assert_eq!(terms.get_str(1)?, "");
        terms.sanity_check()?;

        let docs = VarRecordStore::open("docs", &config)?;
        assert_eq!(docs.len(), 3);
        assert_eq!(docs.get(0)?, vec![3, 1, 4]);
        assert_eq!(docs.get(2)?, vec![1 << 40]);
        assert_eq!(docs.width(), 6);
        docs.sanity_check()?;
    }
    Ok(())
}

#[test]
fn test_linked_store_round_trip() -> Result<()> {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for config in configs(&dir) {
        let mut lists = LinkedRecordStore::create("postings", &config)?;
        for v in 0..50 {
            lists.append((v % 4) as usize, v * 7)?;
        }
        lists.remove_first(2)?;
        lists.remove_value(3, 7 * 7)?;
        let expected: Vec<Vec<i64>> = (0..4)
            .map(|c| lists.values(c))
            .collect::<Result<_>>()?;
        let free = lists.chains().free_count()?;
        lists.persist()?;
        lists.close()?;

        let lists = LinkedRecordStore::open("postings", &config)?;
        assert_eq!(lists.chain_count(), 4);
        assert_eq!(lists.chains().free_count()?, free);
        for (chain, values) in expected.iter().enumerate() {
            assert_eq!(&lists.values(chain)?, values);
        }
        lists.sanity_check()?;
    }
    Ok(())
}

#[test]
fn test_copy_and_delete_move_every_resource() -> Result<()> {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = StoreConfig::heap(dir.path());

    let mut lists = LinkedRecordStore::create("src", &config)?;
    lists.append(0, 1)?;
    lists.append(1, 2)?;
    lists.persist()?;

    let mut copy = lists.copy_as("dst")?;
    copy.persist()?;
    for name in ["dst", "dst.Next", "dst.Last", "dst.N"] {
        assert!(store_exists(name, &config), "missing {}", name);
    }

    copy.close_and_delete()?;
    for name in ["dst", "dst.Next", "dst.Last", "dst.N"] {
        assert!(!store_exists(name, &config), "left behind {}", name);
    }
    assert!(store_exists("src.Next", &config));
    lists.close()
}

#[test]
fn test_missing_offsets_is_invalid_config() -> Result<()> {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = StoreConfig::heap(dir.path());

    let mut payload = VarArray::create("orphan", &config)?;
    payload.push(1)?;
    payload.persist()?;

    let err = VarRecordStore::open("orphan", &config).expect_err("offsets are missing");
    assert!(matches!(err, varstore::error::Error::InvalidConfig(_)));
    Ok(())
}

#[test]
fn test_config_from_toml() -> Result<()> {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let text = format!(
        "backing = \"mmap\"\ndirectory = {:?}\ninitial_width = 2\n",
        dir.path().display().to_string()
    );
    let config = StoreConfig::from_toml_str(&text)?;
    let mut vars = VarArray::create("configured", &config)?;
    assert_eq!(vars.width(), 2);
    assert_eq!(vars.kind(), varstore::storage::BackingKind::Mmap);
    vars.push(1)?;
    vars.close_and_delete()?;
    assert!(!store_exists("configured", &config));
    Ok(())
}

#[test]
fn test_mmap_resources_open_as_heap() -> Result<()> {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mmap = StoreConfig::mmap(dir.path());
    let heap = StoreConfig::heap(dir.path());

    let mut vars = VarArray::create("shared", &mmap)?;
    vars.extend_from_slice(&[1, 2, 3])?;
    vars.persist()?;
    vars.close()?;

    let mut docs = VarRecordStore::create("docs", &mmap)?;
    docs.push(&[7, 8])?;
    docs.push(&[300])?;
    docs.persist()?;
    docs.close()?;

    let vars = VarArray::open("shared", &heap)?;
    assert_eq!(vars.to_vec(), vec![1, 2, 3]);
    vars.sanity_check()?;

    let docs = VarRecordStore::open("docs", &heap)?;
    assert_eq!(docs.len(), 2);
    assert_eq!(docs.get(0)?, vec![7, 8]);
    assert_eq!(docs.get(1)?, vec![300]);
    docs.sanity_check()
}
