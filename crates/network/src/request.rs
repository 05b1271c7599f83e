use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::errors::NetworkError;

/// An HTTP request bound for a single origin.
///
/// No request `mode`/`credentials` fields: this client has no document or
/// cross-origin concept, every caller in this workspace is a backend
/// process talking directly to one origin at a time.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// Builder for [`Request`].
pub struct RequestBuilder {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

impl RequestBuilder {
    pub fn try_new(url: &str) -> Result<Self, NetworkError> {
        let parsed_url = Url::parse(url)
            .map_err(|err| NetworkError::InvalidUrl(format!("{url}: {err}")))?;

        Ok(RequestBuilder::from(parsed_url))
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn header(self, key: HeaderName, value: &str) -> Self {
        self.try_header(key, value).unwrap()
    }

    pub fn try_header(mut self, key: HeaderName, value: &str) -> Result<Self, NetworkError> {
        let header_value = HeaderValue::from_str(value)
            .map_err(|err| NetworkError::InvalidHeader(format!("{key}: {err}")))?;

        self.headers.insert(key, header_value);
        Ok(self)
    }

    /// Sets an inclusive byte `Range` header, e.g. `bytes=0-1023`.
    pub fn range(self, start: u64, end_inclusive: u64) -> Self {
        self.header(
            http::header::RANGE,
            &format!("bytes={start}-{end_inclusive}"),
        )
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn build(self) -> Request {
        Request {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl From<Url> for RequestBuilder {
    fn from(url: Url) -> Self {
        RequestBuilder {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}
