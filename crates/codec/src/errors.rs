use thiserror::Error;

/// Failures decoding a buffer written with [`crate::buffer::Writer`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer underrun: needed {needed} bytes, had {available}")]
    UnexpectedEof { needed: usize, available: usize },

    #[error("invalid UTF-8 in encoded string")]
    InvalidUtf8,

    #[error("unknown value tag {0:#x}")]
    UnknownTag(u8),

    #[error("length {0} exceeds the 32-bit varint range")]
    LengthOverflow(u64),
}
