use thiserror::Error;

/// Failures reported by the LRU file cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index record malformed at offset {0}")]
    MalformedIndex(u64),

    #[error("cache directory not resolvable")]
    NoCacheDir,
}
