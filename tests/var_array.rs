//! VarArray behavior across width changes

use varstore::error::Result;
use varstore::storage::dangerous::DangerousVarArray;
use varstore::VarArray;

/// Deterministic value stream covering every width
fn values() -> Vec<i64> {
    let mut out = Vec::new();
    let mut x: i64 = 1;
    for _ in 0..64 {
        out.push(x);
        out.push(x.wrapping_neg());
        out.push(x.wrapping_sub(1));
        x = x.wrapping_mul(3).wrapping_add(1);
    }
    out.push(i64::MAX);
    out.push(i64::MIN);
    out
}

fn minimal_width(v: i64) -> usize {
    (1..=8)
        .find(|w| {
            let bits = 8 * *w as u32;
            if bits == 64 {
                return true;
            }
            let min = -(1i128 << (bits - 1));
            let max = (1i128 << (bits - 1)) - 1;
            (min..=max).contains(&(v as i128))
        })
        .unwrap_or(8)
}

#[test]
fn test_width_tracks_largest_magnitude() -> Result<()> {
    let mut vars = VarArray::in_memory("minimal");
    let mut expected_width = 1;
    let mut written = Vec::new();

    for v in values() {
        vars.push(v)?;
        written.push(v);
        expected_width = expected_width.max(minimal_width(v));
        assert_eq!(vars.width(), expected_width, "after pushing {}", v);
    }

    assert_eq!(vars.to_vec(), written);
    for (i, v) in written.iter().enumerate() {
        assert_eq!(vars.get(i)?, *v);
    }
    Ok(())
}

#[test]
fn test_width_scenario() -> Result<()> {
    let mut vars = VarArray::in_memory("scenario");
    assert_eq!(vars.width(), 1);
    vars.push(200)?;
    assert_eq!(vars.width(), 2);
    assert_eq!(vars.get(0)?, 200);
    vars.push(-5)?;
    assert_eq!(vars.width(), 2);
    assert_eq!(vars.get(1)?, -5);
    Ok(())
}

#[test]
fn test_grow_then_shrink_restores_values() -> Result<()> {
    let initial = vec![0, 1, -1, 127, -128, 55, -77];
    let mut vars = VarArray::in_memory("resize");
    vars.extend_from_slice(&initial)?;
    assert_eq!(vars.width(), 1);

    for width in 2..=8 {
        vars.set_width(width)?;
        assert_eq!(vars.to_vec(), initial, "grown to {}", width);
    }
    vars.set_width(1)?;
    assert_eq!(vars.to_vec(), initial);

    vars.set_width(8)?;
    vars.shrink_width_to_fit()?;
    assert_eq!(vars.width(), 1);
    assert_eq!(vars.to_vec(), initial);
    Ok(())
}

#[test]
fn test_batch_matches_single_access() -> Result<()> {
    let data = values();
    let mut single = VarArray::in_memory("single");
    let mut batch = VarArray::in_memory("batch");

    single.set_len(data.len())?;
    for (i, v) in data.iter().enumerate() {
        single.set(i, *v)?;
    }
    batch.set_len(data.len())?;
    batch.set_many(0, &data)?;

    let mut out = vec![0; data.len()];
    batch.get_many(0, &mut out)?;
    assert_eq!(out, single.to_vec());
    assert_eq!(single.width(), batch.width());
    assert_eq!(single.hash_range(0, data.len())?, VarArray::hash_slice(&data));
    Ok(())
}

#[test]
fn test_add_to_and_repeated() -> Result<()> {
    let mut vars = VarArray::in_memory("counts");
    vars.push_repeated(7, 5)?;
    assert_eq!(vars.len(), 5);
    assert_eq!(vars.add_to(2, 0)?, 7);
    assert_eq!(vars.add_to(2, 1_000)?, 1_007);
    assert_eq!(vars.width(), 2);
    assert_eq!(vars.to_vec(), vec![7, 7, 1_007, 7, 7]);
    assert!(vars.add_to(5, 1).is_err());
    Ok(())
}

#[test]
fn test_hash_ignores_width() -> Result<()> {
    let mut narrow = VarArray::in_memory("narrow");
    let mut wide = VarArray::in_memory("wide");
    narrow.extend_from_slice(&[1, 2, 3])?;
    wide.extend_from_slice(&[1, 2, 3])?;
    wide.set_width(8)?;
    assert_eq!(narrow.hash_range(0, 3)?, wide.hash_range(0, 3)?);
    Ok(())
}
