use http::{HeaderMap, StatusCode};

/// The first part of an HTTP response: status and headers, available before
/// the body has been read.
pub struct HeaderResponse {
    pub status_code: StatusCode,
    pub headers: HeaderMap,
}

impl HeaderResponse {
    pub fn new(status_code: StatusCode, headers: HeaderMap) -> Self {
        HeaderResponse {
            status_code,
            headers,
        }
    }
}

/// A complete HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status_code: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl From<Vec<u8>> for Response {
    fn from(body: Vec<u8>) -> Self {
        Response {
            status_code: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Some(body),
        }
    }
}
