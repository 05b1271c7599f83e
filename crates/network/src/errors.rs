use thiserror::Error;

/// Errors preventing a network request from completing.
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("network error: {0}")]
    RuntimeError(String),

    #[error("connection timed out")]
    Timeout,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("server responded with status {0}")]
    Status(u16),
}

/// Errors surfaced by the higher-level request helpers.
#[derive(Error, Debug, Clone)]
pub enum RequestError {
    #[error("network request failed: {0}")]
    Network(#[from] NetworkError),

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("request body is empty")]
    EmptyBody,
}
