use thiserror::Error;

/// Failures reported by the cached HTTP coordinator.
#[derive(Error, Debug)]
pub enum ChcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server responded with status {0}")]
    Http(u16),

    #[error("network error: {0}")]
    Network(#[from] network::NetworkError),

    #[error("cache error: {0}")]
    Cache(#[from] lfc::CacheError),

    #[error("downloaded file was empty")]
    EmptyCache,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sidecar error: {0}")]
    Sidecar(#[from] pcf::PcfError),

    #[error("codec error: {0}")]
    Codec(#[from] codec::CodecError),

    #[error("cache directory could not be resolved")]
    NoCacheDir,
}
