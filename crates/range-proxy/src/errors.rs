use thiserror::Error;

/// Failures reported by the range-proxy adapter.
#[derive(Error, Debug)]
pub enum RangeProxyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("partial-content cache error: {0}")]
    Pcf(#[from] pcf::PcfError),

    #[error("invalid target URL in request path: {0}")]
    InvalidUrl(String),
}
