//! HTTP client abstraction used by the cache crates, decoupling callers from
//! the concrete client implementation.

pub mod client;
pub mod clients;
pub mod errors;
pub mod request;
pub mod response;

pub use client::{HttpClient, ResponseHandle};
pub use errors::{NetworkError, RequestError};
pub use request::{Request, RequestBuilder};
pub use response::{HeaderResponse, Response};
