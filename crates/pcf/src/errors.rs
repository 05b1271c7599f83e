use thiserror::Error;

/// Failures reported by the partial-content cache file.
#[derive(Error, Debug)]
pub enum PcfError {
    #[error("sidecar file malformed: {0}")]
    MalformedSidecar(String),

    #[error("URL hash collision: expected {expected:x}, sidecar held {found:x}")]
    HashCollision { expected: u64, found: u64 },

    #[error("network error: {0}")]
    Http(#[from] network::NetworkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("origin response had no usable content")]
    EmptyCache,
}
