//! Durable, bounded, least-recently-used cache over files on disk, keyed by
//! a 64-bit URL hash.

pub mod errors;
mod index;
mod lfc;

pub use errors::CacheError;
pub use lfc::Lfc;
