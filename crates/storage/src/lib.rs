//! OS directory resolution for the cache crates.

pub mod paths;

pub use paths::cache_root;
