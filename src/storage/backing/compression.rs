//! Compression support for persisted heap resources

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Compression algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    #[default]
    None,
    Zstd,
}

impl CompressionAlgorithm {
    /// Header flag bits
    pub(crate) fn to_flag(self) -> u32 {
        match self {
            CompressionAlgorithm::None => 0,
            CompressionAlgorithm::Zstd => 1,
        }
    }

    pub(crate) fn from_flag(flag: u32) -> Result<Self> {
        match flag {
            0 => Ok(CompressionAlgorithm::None),
            1 => Ok(CompressionAlgorithm::Zstd),
            other => Err(Error::InvalidConfig(format!(
                "Unknown compression flag {}",
                other
            ))),
        }
    }
}

/// Compress data using specified algorithm
pub fn compress(data: &[u8], algorithm: CompressionAlgorithm) -> Result<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::None => Ok(data.to_vec()),
        CompressionAlgorithm::Zstd => {
            let mut encoder = zstd::Encoder::new(Vec::new(), 3)
                .map_err(|e| Error::Storage(format!("Failed to create zstd encoder: {}", e)))?;
            encoder
                .write_all(data)
                .map_err(|e| Error::Storage(format!("Failed to compress: {}", e)))?;
            encoder
                .finish()
                .map_err(|e| Error::Storage(format!("Failed to finish compression: {}", e)))
        }
    }
}

/// Decompress data using specified algorithm
pub fn decompress(data: &[u8], algorithm: CompressionAlgorithm) -> Result<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::None => Ok(data.to_vec()),
        CompressionAlgorithm::Zstd => zstd::decode_all(data)
            .map_err(|e| Error::Storage(format!("Failed to decompress: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_none() -> Result<()> {
        let data = b"\x01\x02\x03\x04";
        let compressed = compress(data, CompressionAlgorithm::None)?;
        assert_eq!(compressed, data);
        assert_eq!(decompress(&compressed, CompressionAlgorithm::None)?, data);
        Ok(())
    }

    #[test]
    fn test_compression_zstd_packed_vars() -> Result<()> {
        // Narrow packed vars are highly repetitive in their high bytes
        let data: Vec<u8> = (0..4096u32).flat_map(|v| (v as u16).to_le_bytes()).collect();
        let compressed = compress(&data, CompressionAlgorithm::Zstd)?;
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed, CompressionAlgorithm::Zstd)?, data);
        Ok(())
    }

    #[test]
    fn test_flag_round_trip() -> Result<()> {
        for algo in [CompressionAlgorithm::None, CompressionAlgorithm::Zstd] {
            assert_eq!(CompressionAlgorithm::from_flag(algo.to_flag())?, algo);
        }
        assert!(CompressionAlgorithm::from_flag(7).is_err());
        Ok(())
    }
}
