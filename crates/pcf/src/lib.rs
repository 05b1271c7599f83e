//! Block-level, sparse cache for a single URL: reads are served from
//! whatever blocks are already on disk while missing ranges are downloaded
//! from the origin on demand.

mod bitmap;
pub mod errors;
mod pcf;
pub mod sidecar;
mod table;

pub use errors::PcfError;
pub use pcf::Pcf;
pub use table::clear_all;
