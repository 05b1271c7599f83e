use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use codec::hash_url;
use constants::{events, keys, PCF_BLOCK_SIZE};
use network::{HttpClient, RequestBuilder, ResponseHandle};
use tokio::sync::{mpsc, Mutex as AsyncMutex, OnceCell};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{instrument, trace, warn};

use crate::bitmap::Bitmap;
use crate::errors::PcfError;
use crate::sidecar::{self, HeaderBlock};
use crate::table;

/// Runtime state for one URL's partial-content cache, resident for as long
/// as `ref_count > 0`.
pub(crate) struct PcfState {
    pub(crate) data_file: File,
    pub(crate) sidecar_file: File,
    pub(crate) data_length: u64,
    pub(crate) block_count: u64,
    pub(crate) blocks: Bitmap,
    pub(crate) headers_offset: u64,
    pub(crate) pending_byte: Option<u64>,
    pub(crate) response_headers: Vec<(String, String)>,
    /// The still-open, full-file response from a fresh origin fetch,
    /// consumed in place of a new `Range` request by the first `read()`
    /// that starts at offset 0.
    pub(crate) origin_stream: Option<Box<dyn ResponseHandle>>,
}

/// Process-wide, ref-counted entry for one URL. Dedups concurrent `open`s so
/// at most one instance backs a given URL at a time.
pub(crate) struct PcfShared {
    pub(crate) url: String,
    pub(crate) key: u64,
    pub(crate) data_path: PathBuf,
    pub(crate) sidecar_path: PathBuf,
    pub(crate) ref_count: std::sync::atomic::AtomicUsize,
    pub(crate) init: OnceCell<()>,
    pub(crate) state: AsyncMutex<Option<PcfState>>,
}

/// A handle to a single URL's partial-content cache. Obtained via
/// [`Pcf::open`]; dropping it (via [`Pcf::close`]) releases the reference.
pub struct Pcf {
    shared: Arc<PcfShared>,
    client: Arc<dyn HttpClient>,
}

fn collect_headers(headers: &http::HeaderMap) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for (name, value) in headers.iter() {
        let name = name.as_str().to_string();
        if out.iter().any(|(n, _)| n == &name) {
            continue;
        }
        out.push((name, value.to_str().unwrap_or_default().to_string()));
    }
    out
}

fn content_length(headers: &[(String, String)]) -> Option<u64> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse().ok())
}

impl Pcf {
    /// Resolves the data and sidecar paths for `url` (via `hash_url`),
    /// dedups against any other live PCF for the same URL, and ensures the
    /// backing state is initialized either from an existing sidecar or from
    /// a fresh origin fetch. Returns the content length.
    #[instrument(skip(client), fields(url = %url))]
    pub async fn open(
        url: &str,
        data_path: PathBuf,
        sidecar_path: PathBuf,
        client: Arc<dyn HttpClient>,
    ) -> Result<Self, PcfError> {
        let key = hash_url(url);
        let shared = table::accrue(url, key, data_path, sidecar_path);

        trace!({ keys::EVENT } = events::EVENT_PCF_ACCRUE, { keys::KEY } = key);

        shared
            .init
            .get_or_try_init(|| init_state(Arc::clone(&shared), url, Arc::clone(&client)))
            .await?;

        Ok(Pcf { shared, client })
    }

    pub async fn data_length(&self) -> u64 {
        self.shared.state.lock().await.as_ref().unwrap().data_length
    }

    pub async fn response_headers(&self) -> Vec<(String, String)> {
        self.shared
            .state
            .lock()
            .await
            .as_ref()
            .unwrap()
            .response_headers
            .clone()
    }

    pub async fn is_full(&self) -> bool {
        self.shared.state.lock().await.as_ref().unwrap().blocks.is_full()
    }

    /// Streams bytes `[start, end)`, mixing cached blocks with on-demand
    /// range downloads. Dropping the returned stream early cancels the read
    /// cooperatively: in-flight writes complete, the bitmap reflects only
    /// blocks that were actually written.
    pub fn read(&self, start: u64, end: u64) -> ReceiverStream<Result<Vec<u8>, PcfError>> {
        let (tx, rx) = mpsc::channel(4);
        let shared = Arc::clone(&self.shared);
        let client = Arc::clone(&self.client);
        let url = self.shared.url.clone();

        tokio::spawn(async move {
            if let Err(err) = run_read(shared, client, url, start, end, tx.clone()).await {
                let _ = tx.send(Err(err)).await;
            }
        });

        ReceiverStream::new(rx)
    }

    /// Releases this handle's reference. If it was the last reference and
    /// bytes were written, the caller's [`lfc::Lfc`] is asked to account for
    /// the new size.
    #[instrument(skip(self, lfc))]
    pub fn close(self, lfc: &lfc::Lfc) {
        trace!({ keys::EVENT } = events::EVENT_PCF_RELEASE, { keys::KEY } = self.shared.key);

        if table::release(&self.shared) {
            if let Err(err) = lfc.update(self.shared.key) {
                warn!("failed to update LFC after PCF release: {err}");
            }
        }
    }
}

async fn init_state(
    shared: Arc<PcfShared>,
    url: &str,
    client: Arc<dyn HttpClient>,
) -> Result<(), PcfError> {
    if let Some(state) = try_load_from_sidecar(&shared, url)? {
        *shared.state.lock().await = Some(state);
        return Ok(());
    }

    let state = fetch_fresh(&shared, url, client).await?;
    *shared.state.lock().await = Some(state);
    Ok(())
}

fn try_load_from_sidecar(shared: &PcfShared, url: &str) -> Result<Option<PcfState>, PcfError> {
    let mut sidecar_file = match OpenOptions::new().read(true).write(true).open(&shared.sidecar_path) {
        Ok(f) => f,
        Err(_) => return Ok(None),
    };

    let (block, headers_offset, bitmap_bytes) = match sidecar::read_sidecar(&mut sidecar_file) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    if block.url != url {
        return Err(PcfError::HashCollision {
            expected: shared.key,
            found: hash_url(&block.url),
        });
    }

    let Some(data_length) = content_length(&block.headers) else {
        return Ok(None);
    };
    if data_length == 0 {
        return Ok(None);
    }

    let block_count = data_length.div_ceil(PCF_BLOCK_SIZE);
    let blocks = Bitmap::from_bytes(bitmap_bytes, block_count);

    let data_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&shared.data_path)?;

    Ok(Some(PcfState {
        data_file,
        sidecar_file,
        data_length,
        block_count,
        blocks,
        headers_offset,
        pending_byte: None,
        response_headers: block.headers,
        origin_stream: None,
    }))
}

/// Opens the origin, records a fresh sidecar with a zeroed bitmap, and
/// leaves the response body unread: the first `read()` starting at offset 0
/// consumes it directly instead of issuing a redundant `Range` request.
/// Every other block is fetched lazily by the read loop's phase 2.
async fn fetch_fresh(
    shared: &PcfShared,
    url: &str,
    client: Arc<dyn HttpClient>,
) -> Result<PcfState, PcfError> {
    let request = RequestBuilder::try_new(url)?
        .header(http::header::ACCEPT_ENCODING, "identity")
        .build();

    let response = client.send(request).await?;
    let headers = collect_headers(&response.metadata().headers);
    let data_length = content_length(&headers).ok_or(PcfError::EmptyCache)?;

    if data_length == 0 {
        return Err(PcfError::EmptyCache);
    }

    let block_count = data_length.div_ceil(PCF_BLOCK_SIZE);
    let bitmap_len = block_count.div_ceil(8) as usize;

    let mut sidecar_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&shared.sidecar_path)?;
    let headers_offset = sidecar::write_fresh_sidecar(
        &mut sidecar_file,
        &HeaderBlock {
            url: url.to_string(),
            headers: headers.clone(),
        },
        bitmap_len,
    )?;

    let data_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&shared.data_path)?;

    let blocks = Bitmap::zeroed(block_count);

    Ok(PcfState {
        data_file,
        sidecar_file,
        data_length,
        block_count,
        blocks,
        headers_offset,
        pending_byte: None,
        response_headers: headers,
        origin_stream: Some(response),
    })
}

/// Writes out a previously pending bitmap byte if `new_byte` differs from
/// it, then returns `new_byte` as the freshly pending one.
fn flush_pending(
    sidecar_file: &mut File,
    headers_offset: u64,
    blocks: &Bitmap,
    pending_byte: Option<u64>,
    new_byte: u64,
) -> Result<Option<u64>, PcfError> {
    if let Some(prev) = pending_byte {
        if prev != new_byte {
            sidecar::write_bitmap_byte(sidecar_file, headers_offset, prev, blocks.byte_at(prev))?;
        }
    }
    Ok(Some(new_byte))
}

async fn run_read(
    shared: Arc<PcfShared>,
    client: Arc<dyn HttpClient>,
    url: String,
    start: u64,
    end: u64,
    tx: mpsc::Sender<Result<Vec<u8>, PcfError>>,
) -> Result<(), PcfError> {
    let mut guard = shared.state.lock().await;
    let state = guard.as_mut().expect("PCF state initialized before read");

    let end = end.min(state.data_length);
    if start >= end {
        return Ok(());
    }

    let b = PCF_BLOCK_SIZE;
    let mut i = start / b;
    let mut pos = i * b;

    trace!({ keys::EVENT } = events::EVENT_PCF_READ, { keys::RANGE } = format!("{start}-{end}"));

    'outer: while pos < end {
        state.data_file.seek(SeekFrom::Start(pos))?;

        while i < state.block_count && state.blocks.is_set(i) && pos < end {
            let want = (b.min(state.data_length - pos)) as usize;
            let mut buf = vec![0u8; want];
            let n = state.data_file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            buf.truncate(n);

            if !send_slice(&tx, &buf, pos, start, end).await {
                return Ok(());
            }

            pos += n as u64;
            i += 1;
        }

        if pos >= end {
            break;
        }

        let stop_i = state
            .blocks
            .next_set_from(i + 1)
            .unwrap_or(state.block_count)
            .min((end - 1) / b + 1);
        let stop_pos = (stop_i * b).min(state.data_length);
        let start_pos = i * b;
        pos = start_pos;

        state.data_file.seek(SeekFrom::Start(start_pos))?;

        let reused_origin = if start_pos == 0 {
            state.origin_stream.take()
        } else {
            None
        };

        let mut response = match reused_origin {
            Some(stream) => stream,
            None => {
                let request = RequestBuilder::try_new(&url)?
                    .header(http::header::ACCEPT_ENCODING, "identity")
                    .range(start_pos, stop_pos - 1)
                    .build();
                client.send(request).await?
            }
        };

        while let Some(chunk) = response.chunk().await? {
            state.data_file.write_all(&chunk)?;

            if !send_slice(&tx, &chunk, pos, start, end).await {
                break 'outer;
            }

            pos += chunk.len() as u64;

            while pos >= ((i + 1) * b).min(state.data_length) && i < state.block_count {
                let byte_index = state.blocks.set(i);
                state.pending_byte = flush_pending(
                    &mut state.sidecar_file,
                    state.headers_offset,
                    &state.blocks,
                    state.pending_byte,
                    byte_index,
                )?;
                i += 1;
            }

            if pos >= stop_pos {
                break;
            }
        }
    }

    if let Some(byte_index) = state.pending_byte.take() {
        sidecar::write_bitmap_byte(
            &mut state.sidecar_file,
            state.headers_offset,
            byte_index,
            state.blocks.byte_at(byte_index),
        )?;
    }

    Ok(())
}

/// Slices `[start,end)` out of a chunk spanning `[chunk_pos, chunk_pos +
/// chunk.len())` and sends it, returning `false` if the receiver was
/// dropped (the read was cancelled).
async fn send_slice(
    tx: &mpsc::Sender<Result<Vec<u8>, PcfError>>,
    chunk: &[u8],
    chunk_pos: u64,
    start: u64,
    end: u64,
) -> bool {
    let lo = start.saturating_sub(chunk_pos) as usize;
    let hi = (end.saturating_sub(chunk_pos)).min(chunk.len() as u64) as usize;
    if lo >= hi {
        return true;
    }
    tx.send(Ok(chunk[lo..hi].to_vec())).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use network::{HeaderResponse, NetworkError, Request};
    use std::sync::Mutex as StdMutex;
    use tokio_stream::StreamExt;

    /// Max bytes handed back per `chunk()` call, so a single `send()` is
    /// consumed over several iterations like a real streaming body would be.
    const STUB_CHUNK: usize = 5000;

    #[derive(Debug, Clone)]
    struct StubClient {
        body: Vec<u8>,
        requests: Arc<StdMutex<Vec<Option<(u64, u64)>>>>,
    }

    struct StubHandle {
        metadata: HeaderResponse,
        remaining: StdMutex<Vec<u8>>,
    }

    #[async_trait]
    impl ResponseHandle for StubHandle {
        fn metadata(&self) -> &HeaderResponse {
            &self.metadata
        }

        async fn chunk(&mut self) -> Result<Option<Vec<u8>>, NetworkError> {
            let mut remaining = self.remaining.lock().unwrap();
            if remaining.is_empty() {
                return Ok(None);
            }
            let take = STUB_CHUNK.min(remaining.len());
            Ok(Some(remaining.drain(..take).collect()))
        }
    }

    fn parse_stub_range(value: &str) -> Option<(u64, u64)> {
        let value = value.strip_prefix("bytes=")?;
        let (start, end) = value.split_once('-')?;
        Some((start.parse().ok()?, end.parse().ok()?))
    }

    #[async_trait]
    impl HttpClient for StubClient {
        async fn send(&self, request: Request) -> Result<Box<dyn ResponseHandle>, NetworkError> {
            let range = request
                .headers
                .get(http::header::RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_stub_range);

            let slice = match range {
                Some((start, end)) => self.body[start as usize..=end as usize].to_vec(),
                None => self.body.clone(),
            };
            self.requests.lock().unwrap().push(range);

            let mut headers = http::HeaderMap::new();
            headers.insert(
                http::header::CONTENT_LENGTH,
                self.body.len().to_string().parse().unwrap(),
            );

            Ok(Box::new(StubHandle {
                metadata: HeaderResponse::new(http::StatusCode::OK, headers),
                remaining: StdMutex::new(slice),
            }))
        }

        fn box_clone(&self) -> Box<dyn HttpClient> {
            Box::new(self.clone())
        }
    }

    fn scratch_paths(name: &str) -> (PathBuf, PathBuf) {
        let mut dir = std::env::temp_dir();
        dir.push(format!("pcf-test-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        (dir.join("data"), dir.join("data.i"))
    }

    async fn drain(
        mut stream: ReceiverStream<Result<Vec<u8>, PcfError>>,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn fresh_open_leaves_the_bitmap_zeroed_without_downloading() {
        let (data_path, sidecar_path) = scratch_paths("lazy-open");
        let body = vec![7u8; 40_000];
        let stub = Arc::new(StubClient {
            body,
            requests: Arc::new(StdMutex::new(Vec::new())),
        });
        let client: Arc<dyn HttpClient> = stub.clone();

        let pcf = Pcf::open(
            "https://example.com/lazy",
            data_path.clone(),
            sidecar_path,
            client,
        )
        .await
        .unwrap();

        assert_eq!(pcf.data_length().await, 40_000);
        assert!(!pcf.is_full().await);
        assert_eq!(std::fs::metadata(&data_path).unwrap().len(), 0);
        assert_eq!(stub.requests.lock().unwrap().clone(), vec![None]);

        std::fs::remove_dir_all(data_path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn full_read_from_zero_reuses_the_open_origin_stream() {
        let (data_path, sidecar_path) = scratch_paths("reuse-origin");
        let body: Vec<u8> = (0..40_000u32).map(|b| b as u8).collect();
        let stub = Arc::new(StubClient {
            body: body.clone(),
            requests: Arc::new(StdMutex::new(Vec::new())),
        });
        let client: Arc<dyn HttpClient> = stub.clone();

        let pcf = Pcf::open(
            "https://example.com/full",
            data_path.clone(),
            sidecar_path,
            client,
        )
        .await
        .unwrap();

        let bytes = drain(pcf.read(0, 40_000)).await;

        assert_eq!(bytes, body);
        assert!(pcf.is_full().await);
        // one request total: the initial open. The full read is served by
        // the already-open response, not a second network call.
        assert_eq!(stub.requests.lock().unwrap().len(), 1);

        std::fs::remove_dir_all(data_path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn unaligned_mid_read_fetches_only_the_missing_block() {
        let (data_path, sidecar_path) = scratch_paths("unaligned");
        let body: Vec<u8> = (0..40_000u32).map(|b| b as u8).collect();
        let stub = Arc::new(StubClient {
            body: body.clone(),
            requests: Arc::new(StdMutex::new(Vec::new())),
        });
        let client: Arc<dyn HttpClient> = stub.clone();

        let pcf = Pcf::open(
            "https://example.com/unaligned",
            data_path.clone(),
            sidecar_path,
            client,
        )
        .await
        .unwrap();

        let bytes = drain(pcf.read(20_000, 25_000)).await;
        assert_eq!(bytes, body[20_000..25_000]);

        let requests = stub.requests.lock().unwrap().clone();
        assert_eq!(requests, vec![None, Some((16_384, 32_767))]);
        drop(requests);

        // The previous read never touched offset 0, so the origin stream
        // opened at `open()` is still unconsumed and gets reused here
        // instead of issuing a third request.
        let bytes = drain(pcf.read(0, 16_384)).await;
        assert_eq!(bytes, body[0..16_384]);
        assert_eq!(stub.requests.lock().unwrap().len(), 2);

        std::fs::remove_dir_all(data_path.parent().unwrap()).ok();
    }
}
