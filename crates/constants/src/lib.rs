//! Shared literal constants used across the cache crates.

pub mod events;
pub mod keys;

/// Name used when resolving OS cache/config/data directories.
pub const APP_NAME: &str = "http_cache";

/// Subdirectory of the cache root the coordinator stores its data under.
pub const CACHE_SUBDIR: &str = "http_cache";

/// Block size, in bytes, used by the partial-content cache file.
pub const PCF_BLOCK_SIZE: u64 = 16384;

/// Default byte budget for the coordinator's LRU file cache.
pub const DEFAULT_LFC_MAX_SIZE: u64 = 200 * 1024 * 1024;

/// Magic bytes prefixing a binary-encoded JSON cache file (`"json"` little-endian).
pub const JSON_CACHE_MAGIC: u32 = 0x6E6F_736A;

/// Size, in bytes, of one LFC index record.
pub const LFC_RECORD_SIZE: u64 = 24;
