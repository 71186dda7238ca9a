pub mod disk;
pub mod key;
pub mod writer;

pub use disk::DiskCache;
pub use key::CacheKey;
pub use writer::CacheWriter;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to create {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: std::io::Error },
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: std::io::Error },
}

/// Trait for variant cache backends
#[async_trait::async_trait]
pub trait Cache: Send + Sync {
    /// Returns the stored variant, `None` on a miss.
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores a variant, replacing whatever was there.
    async fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError>;
}
