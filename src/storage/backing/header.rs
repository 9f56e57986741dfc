//! Persisted resource header
//!
//! Every persisted resource starts with a fixed 64-byte header:
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  ---------------------------------------------
//! 0       4     magic "VSTR"
//! 4       4     format version (u32 LE)
//! 8       4     flags (u32 LE, low bits = compression)
//! 12      4     reserved
//! 16      32    params: 4 x i64 LE (var width lives in slot 0)
//! 48      8     logical payload length in bytes (u64 LE)
//! 56      8     stored payload length in bytes (u64 LE)
//! ```
//!
//! The stored length differs from the logical length only for compressed
//! heap resources.

use super::compression::CompressionAlgorithm;
use crate::error::{Error, Result};

pub const HEADER_LEN: usize = 64;
pub const PARAM_SLOTS: usize = 4;

const MAGIC: &[u8; 4] = b"VSTR";
const FORMAT_VERSION: u32 = 1;

const PARAMS_AT: usize = 16;
const LEN_AT: usize = 48;
const STORED_LEN_AT: usize = 56;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceHeader {
    pub compression: CompressionAlgorithm,
    pub params: [i64; PARAM_SLOTS],
    pub len: u64,
    pub stored_len: u64,
}

impl ResourceHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[8..12].copy_from_slice(&self.compression.to_flag().to_le_bytes());
        for (slot, value) in self.params.iter().enumerate() {
            let at = PARAMS_AT + slot * 8;
            buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
        }
        buf[LEN_AT..LEN_AT + 8].copy_from_slice(&self.len.to_le_bytes());
        buf[STORED_LEN_AT..STORED_LEN_AT + 8].copy_from_slice(&self.stored_len.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::InvalidConfig(format!(
                "Resource header too short: {} bytes",
                buf.len()
            )));
        }
        if &buf[0..4] != MAGIC {
            return Err(Error::InvalidConfig("Bad resource magic".to_string()));
        }
        let version = read_u32(buf, 4);
        if version != FORMAT_VERSION {
            return Err(Error::InvalidConfig(format!(
                "Unsupported resource format version {}",
                version
            )));
        }
        let compression = CompressionAlgorithm::from_flag(read_u32(buf, 8))?;
        let mut params = [0i64; PARAM_SLOTS];
        for (slot, value) in params.iter_mut().enumerate() {
            *value = read_u64(buf, PARAMS_AT + slot * 8) as i64;
        }
        Ok(Self {
            compression,
            params,
            len: read_u64(buf, LEN_AT),
            stored_len: read_u64(buf, STORED_LEN_AT),
        })
    }

    /// Patch only the params in an already-encoded header.
    pub fn write_param(buf: &mut [u8], slot: usize, value: i64) {
        let at = PARAMS_AT + slot * 8;
        buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Patch the logical and stored length of an uncompressed header.
    pub fn write_len(buf: &mut [u8], len: u64) {
        buf[LEN_AT..LEN_AT + 8].copy_from_slice(&len.to_le_bytes());
        buf[STORED_LEN_AT..STORED_LEN_AT + 8].copy_from_slice(&len.to_le_bytes());
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}
