use thiserror::Error;

/// Failures reported by the persisted key/value store.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] codec::CodecError),

    #[error("data directory could not be resolved")]
    NoDataDir,
}
