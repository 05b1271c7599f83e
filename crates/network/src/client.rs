use std::fmt::Debug;

use async_trait::async_trait;

use crate::{errors::NetworkError, request::Request, response::HeaderResponse};

/// A response whose body may be streamed in chunks rather than buffered
/// whole, so a large range download does not need to live in memory at once.
#[async_trait]
pub trait ResponseHandle: Send + Sync {
    fn metadata(&self) -> &HeaderResponse;

    /// Returns the next chunk of the body, or `None` at end of stream.
    async fn chunk(&mut self) -> Result<Option<Vec<u8>>, NetworkError>;

    /// Buffers the remainder of the body into a single `Vec`.
    async fn bytes(mut self: Box<Self>) -> Result<Vec<u8>, NetworkError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

/// An asynchronous HTTP client.
#[async_trait]
pub trait HttpClient: Send + Sync + Debug {
    async fn send(&self, request: Request) -> Result<Box<dyn ResponseHandle>, NetworkError>;

    fn box_clone(&self) -> Box<dyn HttpClient>;
}

impl Clone for Box<dyn HttpClient> {
    fn clone(&self) -> Box<dyn HttpClient> {
        self.as_ref().box_clone()
    }
}
