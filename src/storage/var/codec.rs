//! Fixed-width two's complement codec
//!
//! A var of width `w` is the low `w` bytes of the value's little-endian
//! two's complement form. Decoding sign-extends from the top stored byte.

use xxhash_rust::xxh64::{xxh64, Xxh64};

pub const MIN_WIDTH: usize = 1;
pub const MAX_WIDTH: usize = 8;

const HASH_SEED: u64 = 0;

/// Smallest width (bytes) that holds `value` in two's complement.
pub fn width_for(value: i64) -> usize {
    let significant = if value >= 0 {
        64 - value.leading_zeros()
    } else {
        64 - value.leading_ones()
    };
    // one extra bit for the sign
    (((significant + 1) as usize + 7) / 8).max(MIN_WIDTH)
}

/// Smallest width that holds every value in `values`.
pub fn width_for_all(values: &[i64]) -> usize {
    values
        .iter()
        .map(|&v| width_for(v))
        .max()
        .unwrap_or(MIN_WIDTH)
}

/// Inclusive value range of a width.
pub fn range_of(width: usize) -> (i64, i64) {
    if width >= MAX_WIDTH {
        return (i64::MIN, i64::MAX);
    }
    let half = 1i64 << (width * 8 - 1);
    (-half, half - 1)
}

#[inline]
pub fn decode(bytes: &[u8]) -> i64 {
    let width = bytes.len();
    let mut buf = if bytes[width - 1] & 0x80 != 0 {
        [0xFFu8; 8]
    } else {
        [0u8; 8]
    };
    buf[..width].copy_from_slice(bytes);
    i64::from_le_bytes(buf)
}

/// Encode the low `out.len()` bytes of `value`. Higher bytes are dropped.
#[inline]
pub fn encode(value: i64, out: &mut [u8]) {
    let width = out.len();
    out.copy_from_slice(&value.to_le_bytes()[..width]);
}

/// Re-encode `count` vars from `old_width` to `new_width` within `src`.
///
/// Writes into `dst`, which must hold `count * new_width` bytes. Growing
/// sign-extends with 0x00 / 0xFF; shrinking drops the high bytes.
pub fn transcode(src: &[u8], old_width: usize, dst: &mut [u8], new_width: usize) {
    let keep = old_width.min(new_width);
    for (from, to) in src
        .chunks_exact(old_width)
        .zip(dst.chunks_exact_mut(new_width))
    {
        to[..keep].copy_from_slice(&from[..keep]);
        if new_width > old_width {
            let pad = if from[old_width - 1] & 0x80 != 0 { 0xFF } else { 0x00 };
            to[old_width..].fill(pad);
        }
    }
}

/// Content hash of a single value.
pub fn hash_value(value: i64) -> u64 {
    xxh64(&value.to_le_bytes(), HASH_SEED)
}

/// Content hash of a value sequence. Independent of storage width.
pub fn hash_values(values: &[i64]) -> u64 {
    let mut hasher = Xxh64::new(HASH_SEED);
    for value in values {
        hasher.update(&value.to_le_bytes());
    }
    hasher.digest()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_boundaries() {
        assert_eq!(width_for(0), 1);
        assert_eq!(width_for(127), 1);
        assert_eq!(width_for(-128), 1);
        assert_eq!(width_for(128), 2);
        assert_eq!(width_for(-129), 2);
        assert_eq!(width_for(200), 2);
        assert_eq!(width_for(32767), 2);
        assert_eq!(width_for(32768), 3);
        assert_eq!(width_for(i32::MAX as i64), 4);
        assert_eq!(width_for(i32::MIN as i64), 4);
        assert_eq!(width_for(i64::MAX), 8);
        assert_eq!(width_for(i64::MIN), 8);
    }

    #[test]
    fn test_width_matches_range() {
        for width in 1..=8 {
            let (lo, hi) = range_of(width);
            assert_eq!(width_for(lo), width);
            assert_eq!(width_for(hi), width);
            if width < 8 {
                assert_eq!(width_for(hi + 1), width + 1);
                assert_eq!(width_for(lo - 1), width + 1);
            }
        }
    }

    #[test]
    fn test_encode_decode_sign_extension() {
        let mut buf = [0u8; 3];
        for value in [0, 1, -1, 8_388_607, -8_388_608, -5, 200] {
            encode(value, &mut buf);
            assert_eq!(decode(&buf), value);
        }
    }

    #[test]
    fn test_encode_truncates_high_bytes() {
        let mut buf = [0u8; 1];
        encode(0x1_23, &mut buf);
        assert_eq!(buf, [0x23]);
        assert_eq!(decode(&buf), 0x23);
    }

    #[test]
    fn test_transcode_grow_and_shrink() {
        let values = [5i64, -5, 100, -128];
        let mut narrow = vec![0u8; values.len()];
        for (v, slot) in values.iter().zip(narrow.chunks_exact_mut(1)) {
            encode(*v, slot);
        }
        let mut wide = vec![0u8; values.len() * 4];
        transcode(&narrow, 1, &mut wide, 4);
        let decoded: Vec<i64> = wide.chunks_exact(4).map(decode).collect();
        assert_eq!(decoded, values);

        let mut back = vec![0u8; values.len()];
        transcode(&wide, 4, &mut back, 1);
        assert_eq!(back, narrow);
    }

    #[test]
    fn test_hash_is_width_independent() {
        assert_eq!(hash_values(&[1, 2, 3]), hash_values(&[1, 2, 3]));
        assert_ne!(hash_values(&[1, 2, 3]), hash_values(&[3, 2, 1]));
        assert_eq!(hash_value(7), hash_values(&[7]));
    }
}
