//! Byte record store with UTF-8 string helpers

use super::payload::ByteData;
use super::OffsetIndexedStore;
use crate::error::{Error, Result};

/// Rows of raw bytes
pub type ByteRecordStore = OffsetIndexedStore<ByteData>;

impl OffsetIndexedStore<ByteData> {
    /// Append a UTF-8 string as a row
    pub fn push_str(&mut self, value: &str) -> Result<usize> {
        self.push(value.as_bytes())
    }

    /// Decode row `index` as UTF-8
    pub fn get_str(&self, index: usize) -> Result<String> {
        String::from_utf8(self.get(index)?).map_err(|e| {
            Error::Encoding(format!("{}: row {} is not UTF-8: {}", self.name(), index, e))
        })
    }

    /// Borrow row `index` without copying
    pub fn row_bytes(&self, index: usize) -> Result<&[u8]> {
        self.check_row(index)?;
        let (start, end) = self.row_bounds(index)?;
        Ok(&self.payload().as_slice()[start..end])
    }

    /// First row equal to `value` (linear scan)
    pub fn find_str(&self, value: &str) -> Result<Option<usize>> {
        let needle = value.as_bytes();
        for index in 0..self.len() {
            if self.row_bytes(index)? == needle {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strings() -> Result<()> {
        let mut terms = ByteRecordStore::in_memory("terms")?;
        terms.push_str("ünïcode")?;
        terms.push_str("")?;
        terms.push_str("plain")?;
        assert_eq!(terms.get_str(0)?, "ünïcode");
        assert_eq!(terms.get_str(1)?, "");
        assert_eq!(terms.find_str("plain")?, Some(2));
        assert_eq!(terms.find_str("missing")?, None);
        Ok(())
    }

    #[test]
    fn test_invalid_utf8() -> Result<()> {
        let mut terms = ByteRecordStore::in_memory("terms")?;
        terms.push(&[0xff, 0xfe])?;
        assert!(matches!(terms.get_str(0), Err(Error::Encoding(_))));
        Ok(())
    }

    #[test]
    fn test_row_bytes_bounds() -> Result<()> {
        let mut terms = ByteRecordStore::in_memory("terms")?;
        terms.push_str("a")?;
        assert_eq!(terms.row_bytes(0)?, b"a");
        assert!(terms.row_bytes(1).is_err());
        Ok(())
    }
}
