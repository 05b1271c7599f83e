//! The cached HTTP coordinator (CHC): a process-wide singleton that
//! deduplicates whole-file downloads through an [`lfc::Lfc`], keyed by URL.

mod chc;
pub mod errors;

pub use chc::{CheckCache, Chc, ProgressCallback};
pub use errors::ChcError;
