use async_trait::async_trait;

use crate::{
    client::{HttpClient, ResponseHandle},
    errors::NetworkError,
    request::Request,
    response::HeaderResponse,
};

/// An [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Default, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        ReqwestClient {
            client: reqwest::Client::new(),
        }
    }
}

pub struct ReqwestHandle {
    inner: reqwest::Response,
    metadata: HeaderResponse,
}

fn classify(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout
    } else if err.is_connect() {
        NetworkError::ConnectionRefused
    } else {
        NetworkError::RuntimeError(err.to_string())
    }
}

#[async_trait]
impl ResponseHandle for ReqwestHandle {
    fn metadata(&self) -> &HeaderResponse {
        &self.metadata
    }

    async fn chunk(&mut self) -> Result<Option<Vec<u8>>, NetworkError> {
        let chunk = self.inner.chunk().await.map_err(classify)?;
        Ok(chunk.map(|b| b.to_vec()))
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: Request) -> Result<Box<dyn ResponseHandle>, NetworkError> {
        let mut req = self.client.request(request.method, request.url);

        for (key, value) in request.headers.iter() {
            req = req.header(key, value);
        }

        if let Some(body) = request.body {
            req = req.body(body);
        }

        let response = req.send().await.map_err(classify)?;

        let status_code = response.status();
        let headers = response.headers().clone();

        let metadata = HeaderResponse {
            status_code,
            headers,
        };

        Ok(Box::new(ReqwestHandle {
            inner: response,
            metadata,
        }))
    }

    fn box_clone(&self) -> Box<dyn HttpClient> {
        Box::new(self.clone())
    }
}
