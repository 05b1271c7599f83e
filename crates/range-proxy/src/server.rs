//! A loopback HTTP server exposing every URL that flows through it as a
//! `Range`-capable local URL: requests are served straight out of a
//! [`pcf::Pcf`], mixing cached blocks with on-demand downloads.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use codec::hash_url;
use constants::{events, keys};
use lfc::Lfc;
use network::HttpClient;
use pcf::Pcf;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{instrument, trace, warn};

use crate::errors::RangeProxyError;
use crate::range::parse_range;
use crate::url_codec::decode_url;

struct ProxyState {
    lfc: Arc<Lfc>,
    client: Arc<dyn HttpClient>,
}

/// A running range-proxy server. Dropping the handle without calling
/// [`RangeProxy::stop`] leaves the server running; call `stop` to shut it
/// down and clear the process-wide PCF table.
pub struct RangeProxy {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: Option<tokio::task::JoinHandle<()>>,
}

impl RangeProxy {
    /// Binds an ephemeral loopback port (`127.0.0.1:0`) and starts serving.
    pub async fn start(lfc: Arc<Lfc>, client: Arc<dyn HttpClient>) -> Result<Self, RangeProxyError> {
        Self::bind(lfc, client, SocketAddr::from(([127, 0, 0, 1], 0))).await
    }

    /// Binds `addr` and starts serving.
    pub async fn bind(
        lfc: Arc<Lfc>,
        client: Arc<dyn HttpClient>,
        addr: SocketAddr,
    ) -> Result<Self, RangeProxyError> {
        let state = Arc::new(ProxyState { lfc, client });
        let app = Router::new()
            .fallback(handle_request)
            .with_state(state);

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let join = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;

            if let Err(err) = result {
                warn!("range proxy server stopped with an error: {err}");
            }
        });

        Ok(RangeProxy {
            addr: local_addr,
            shutdown_tx: Some(shutdown_tx),
            join: Some(join),
        })
    }

    /// The bound loopback address, e.g. `127.0.0.1:54321`.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http://<addr>/`, the base every proxied URL is appended to
    /// (`url_codec::encode_url`).
    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Stops the server and clears the process-wide PCF table.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
        pcf::clear_all();
    }
}

#[instrument(skip(state, headers))]
async fn handle_request(State(state): State<Arc<ProxyState>>, uri: Uri, headers: HeaderMap) -> Response {
    let url = match decode_url(uri.path()) {
        Ok(url) if !url.is_empty() => url,
        _ => return (StatusCode::BAD_REQUEST, "missing or invalid target URL").into_response(),
    };

    trace!({ keys::EVENT } = events::EVENT_PROXY_REQUEST, { keys::URL } = %url);

    let key = hash_url(&url);
    let data_path = state.lfc.data_path(key);
    let sidecar_path = state.lfc.sidecar_path(key);

    let pcf = match Pcf::open(&url, data_path, sidecar_path, Arc::clone(&state.client)).await {
        Ok(pcf) => pcf,
        Err(err) => {
            warn!("failed to open partial-content cache for {url}: {err}");
            return (StatusCode::BAD_GATEWAY, err.to_string()).into_response();
        }
    };

    let length = pcf.data_length().await;
    let response_headers = pcf.response_headers().await;

    let range = headers
        .get(axum::http::header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range);

    let (status, start, end) = match range {
        None => (StatusCode::OK, 0, length),
        Some(r) if r.start >= length => {
            pcf.close(&state.lfc);
            return Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(axum::http::header::CONTENT_RANGE, format!("bytes 0-0/{length}"))
                .body(Body::empty())
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
        Some(r) => {
            let end = r.end.map(|e| e.saturating_add(1)).unwrap_or(length).min(length);
            (StatusCode::PARTIAL_CONTENT, r.start, end)
        }
    };

    let mut builder = Response::builder().status(status);
    for (name, value) in &response_headers {
        if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("content-range") {
            continue;
        }
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            builder = builder.header(name, value);
        }
    }
    builder = builder.header(axum::http::header::CONTENT_LENGTH, (end - start).to_string());
    if status == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(
            axum::http::header::CONTENT_RANGE,
            format!("bytes {start}-{}/{length}", end.saturating_sub(1)),
        );
    }

    let body = streaming_body(pcf, Arc::clone(&state.lfc), start, end);
    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Drives `pcf.read(start, end)` to completion in the background, forwarding
/// chunks into the response body as they arrive and releasing the PCF
/// reference once the stream ends (normally, on error, or because the
/// client disconnected and dropped the body).
fn streaming_body(pcf: Pcf, lfc: Arc<Lfc>, start: u64, end: u64) -> Body {
    let mut read_stream = pcf.read(start, end);
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<axum::body::Bytes, std::io::Error>>(4);

    tokio::spawn(async move {
        while let Some(item) = read_stream.next().await {
            match item {
                Ok(chunk) => {
                    if tx.send(Ok(axum::body::Bytes::from(chunk))).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!("range read failed: {err}");
                    let _ = tx
                        .send(Err(std::io::Error::other(err.to_string())))
                        .await;
                    break;
                }
            }
        }
        pcf.close(&lfc);
    });

    Body::from_stream(ReceiverStream::new(rx))
}
