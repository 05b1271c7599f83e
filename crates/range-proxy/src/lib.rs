//! A loopback HTTP server that exposes any URL flowing through the cache as
//! a `Range`-capable local URL, backed by [`pcf::Pcf`].

pub mod errors;
mod range;
mod server;
mod url_codec;

pub use errors::RangeProxyError;
pub use range::{parse_range, ByteRange};
pub use server::RangeProxy;
pub use url_codec::{decode_url, encode_url};
