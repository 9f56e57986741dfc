// varstore - Rust Implementation
// Packed variable-width record storage and multi-chain link pools

#![warn(rust_2018_idioms)]

pub mod config;
pub mod storage;

// Re-exports for convenience
pub use config::StoreConfig;
pub use storage::{
    ByteRecordStore, ByteStore, ChainAllocator, LinkedRecordStore, OffsetIndexedStore, VarArray,
    VarRecordStore,
};

/// varstore error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Out of bounds: {0}")]
        OutOfBounds(String),

        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Corruption detected: {0}")]
        Corruption(String),

        #[error("Unsupported operation: {0}")]
        Unsupported(String),

        #[error("Storage error: {0}")]
        Storage(String),

        #[error("Encoding error: {0}")]
        Encoding(String),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sentinel for "no link" / "no index" in persisted link arrays.
pub const NOT_FOUND: i64 = -1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_format() {
        let _version: &str = VERSION;
    }

    #[test]
    fn test_error_display() {
        let err = error::Error::OutOfBounds("index 4 >= len 3".to_string());
        assert_eq!(err.to_string(), "Out of bounds: index 4 >= len 3");
    }
}
