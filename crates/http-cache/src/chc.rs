use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use codec::hash_url;
use constants::{events, keys, DEFAULT_LFC_MAX_SIZE};
use http::Method;
use lfc::Lfc;
use network::{clients::reqwest::ReqwestClient, HttpClient, RequestBuilder};
use pcf::sidecar::{self, HeaderBlock};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{instrument, trace};

use crate::errors::ChcError;

/// Called with `(bytes_received, expected_total)` as a download progresses.
pub type ProgressCallback = dyn Fn(u64, Option<u64>) + Send + Sync;

/// Returns `true` if previously-cached headers are still acceptable to
/// serve without revalidating against the origin.
pub type CheckCache = dyn Fn(&[(String, String)]) -> bool + Send + Sync;

struct Item {
    key: u64,
    lock: Arc<AsyncMutex<()>>,
}

/// Process-wide dedup layer over an [`Lfc`]: at most one download per URL
/// runs at a time, and repeat callers for an in-flight URL share its result.
pub struct Chc {
    lfc: Arc<Lfc>,
    client: Arc<dyn HttpClient>,
    loading: Mutex<HashMap<String, Item>>,
}

static SINGLETON: OnceLock<Arc<Chc>> = OnceLock::new();

impl Chc {
    /// Returns the process-wide coordinator, opening its [`Lfc`] under the
    /// OS cache directory on first call.
    pub fn singleton() -> Result<Arc<Chc>, ChcError> {
        if let Some(chc) = SINGLETON.get() {
            return Ok(Arc::clone(chc));
        }

        let root = storage::cache_root().ok_or(ChcError::NoCacheDir)?;
        let chc = Arc::new(Chc::with_root(root, DEFAULT_LFC_MAX_SIZE, Arc::new(ReqwestClient::new()))?);

        Ok(Arc::clone(SINGLETON.get_or_init(|| chc)))
    }

    /// Constructs a coordinator rooted at an arbitrary directory, bypassing
    /// the process-wide singleton. Intended for tests and for composing a
    /// custom root/client pair.
    pub fn with_root(
        root: impl AsRef<Path>,
        max_size: u64,
        client: Arc<dyn HttpClient>,
    ) -> Result<Self, ChcError> {
        Ok(Chc {
            lfc: Arc::new(Lfc::open(root, max_size)?),
            client,
            loading: Mutex::new(HashMap::new()),
        })
    }

    /// The LRU file cache backing this coordinator, shared with collaborators
    /// (such as the range proxy) that need to resolve the same on-disk paths.
    pub fn lfc(&self) -> Arc<Lfc> {
        Arc::clone(&self.lfc)
    }

    pub fn http_client(&self) -> Arc<dyn HttpClient> {
        Arc::clone(&self.client)
    }

    /// Issues a single, uncached HTTP request.
    #[instrument(skip(self, headers))]
    pub async fn open_url(
        &self,
        url: &str,
        method: Method,
        headers: Vec<(String, String)>,
        auto_compress: bool,
    ) -> Result<network::Response, ChcError> {
        let mut builder = RequestBuilder::try_new(url)?.method(method);
        if !auto_compress {
            builder = builder.header(http::header::ACCEPT_ENCODING, "identity");
        }
        for (name, value) in headers {
            builder = builder.try_header(
                http::HeaderName::try_from(name.as_str())
                    .map_err(|_| network::NetworkError::InvalidHeader(name.clone()))?,
                &value,
            )?;
        }

        let response = self.client.send(builder.build()).await?;
        let metadata_status = response.metadata().status_code;
        let metadata_headers = response.metadata().headers.clone();
        let body = response.bytes().await?;

        Ok(network::Response {
            status_code: metadata_status,
            headers: metadata_headers,
            body: Some(body),
        })
    }

    /// Downloads `url` into `dest`, writing through a `.p` temp file and
    /// renaming atomically on success. Returns an error for non-2xx
    /// responses; the temp file is removed on any failure.
    #[instrument(skip(self, headers, progress))]
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        headers: Vec<(String, String)>,
        progress: Option<&ProgressCallback>,
    ) -> Result<(), ChcError> {
        let mut builder = RequestBuilder::try_new(url)?;
        for (name, value) in headers {
            builder = builder.try_header(
                http::HeaderName::try_from(name.as_str())
                    .map_err(|_| network::NetworkError::InvalidHeader(name.clone()))?,
                &value,
            )?;
        }

        let mut response = self.client.send(builder.build()).await?;
        let status = response.metadata().status_code;
        if !status.is_success() {
            return Err(ChcError::Http(status.as_u16()));
        }

        let response_headers = collect_headers(&response.metadata().headers);
        let expected_total = response_headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse::<u64>().ok());

        let tmp_path = dest.with_extension("p");
        let result = self
            .stream_to_file(&mut response, &tmp_path, expected_total, progress)
            .await;

        if let Err(err) = result {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err);
        }

        std::fs::rename(&tmp_path, dest)?;

        let key = hash_url(url);
        let sidecar_path = self.lfc.sidecar_path(key);
        let mut sidecar_file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&sidecar_path)?;
        sidecar::write_fresh_sidecar(
            &mut sidecar_file,
            &HeaderBlock {
                url: url.to_string(),
                headers: response_headers,
            },
            0,
        )?;

        trace!({ keys::EVENT } = events::EVENT_CHC_DOWNLOAD, { keys::URL } = url);
        Ok(())
    }

    async fn stream_to_file(
        &self,
        response: &mut Box<dyn network::ResponseHandle>,
        tmp_path: &Path,
        expected_total: Option<u64>,
        progress: Option<&ProgressCallback>,
    ) -> Result<(), ChcError> {
        use std::io::Write;

        let mut file = std::fs::File::create(tmp_path)?;
        let mut received = 0u64;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)?;
            received += chunk.len() as u64;
            if let Some(cb) = progress {
                cb(received, expected_total);
            }
        }

        if received == 0 {
            return Err(ChcError::EmptyCache);
        }

        Ok(())
    }

    /// Resolves `url`'s cached file path, downloading it if absent or if
    /// `check_cache` rejects the cached headers. Concurrent calls for the
    /// same URL share a single download.
    #[instrument(skip(self, headers, check_cache))]
    pub async fn get_file(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        check_cache: Option<&CheckCache>,
    ) -> Result<PathBuf, ChcError> {
        let key = hash_url(url);

        let item_lock = {
            let mut loading = self.loading.lock().unwrap();
            Arc::clone(
                &loading
                    .entry(url.to_string())
                    .or_insert_with(|| Item {
                        key,
                        lock: Arc::new(AsyncMutex::new(())),
                    })
                    .lock,
            )
        };

        let path = self.lfc.get_file(key);

        let downloaded;
        {
            let _guard = item_lock.lock().await;

            let needs_download = match std::fs::metadata(&path) {
                Ok(meta) if meta.len() > 0 => match self.get_cached_response_headers(url) {
                    Some(cached_headers) => {
                        !check_cache.map(|f| f(&cached_headers)).unwrap_or(true)
                    }
                    None => true,
                },
                _ => true,
            };

            if needs_download {
                self.download_file(url, &path, headers, None).await?;
                downloaded = true;
            } else {
                downloaded = false;
            }
        }

        self.loading.lock().unwrap().remove(url);

        if downloaded {
            self.lfc.update(key)?;
        }

        trace!({ keys::EVENT } = events::EVENT_CHC_GET_FILE, { keys::URL } = url, downloaded);
        Ok(path)
    }

    /// Non-blocking peek at `url`'s cached response headers, or `None` if
    /// the entry is absent or its sidecar cannot be parsed.
    pub fn get_cached_response_headers(&self, url: &str) -> Option<Vec<(String, String)>> {
        let key = hash_url(url);
        let sidecar_path = self.lfc.sidecar_path(key);

        let mut file = std::fs::OpenOptions::new().read(true).open(sidecar_path).ok()?;
        let (block, _, _) = sidecar::read_sidecar(&mut file).ok()?;

        if block.url != url {
            return None;
        }

        Some(block.headers)
    }

    /// Fetches `url` as JSON, caching a binary-encoded form of the value
    /// behind a 4-byte magic prefix so subsequent fetches skip textual
    /// parsing.
    #[instrument(skip(self, headers))]
    pub async fn get_as_json(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
    ) -> Result<codec::Value, ChcError> {
        let path = self.get_file(url, headers, None).await?;
        let bytes = std::fs::read(&path)?;

        if bytes.len() >= 4 {
            let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
            if magic == constants::JSON_CACHE_MAGIC {
                let value = codec::Value::decode_from_slice(&bytes[4..])?;
                trace!({ keys::EVENT } = events::EVENT_CHC_GET_JSON, cached_binary = true);
                return Ok(value);
            }
        }

        let json: serde_json::Value = serde_json::from_slice(&bytes)?;
        let value = codec::Value::from(json);

        let encoded = value.encode_to_vec()?;
        let mut out = constants::JSON_CACHE_MAGIC.to_le_bytes().to_vec();
        out.extend_from_slice(&encoded);
        std::fs::write(&path, &out)?;
        self.lfc.update(hash_url(url))?;

        trace!({ keys::EVENT } = events::EVENT_CHC_GET_JSON, cached_binary = false);
        Ok(value)
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use network::{HeaderResponse, NetworkError, Request, ResponseHandle};
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone)]
    struct StubClient {
        body: Vec<u8>,
        status: http::StatusCode,
        content_type: &'static str,
        requests: Arc<AtomicUsize>,
    }

    struct StubHandle {
        metadata: HeaderResponse,
        remaining: StdMutex<Option<Vec<u8>>>,
    }

    #[async_trait]
    impl ResponseHandle for StubHandle {
        fn metadata(&self) -> &HeaderResponse {
            &self.metadata
        }

        async fn chunk(&mut self) -> Result<Option<Vec<u8>>, NetworkError> {
            Ok(self.remaining.lock().unwrap().take())
        }
    }

    #[async_trait]
    impl HttpClient for StubClient {
        async fn send(&self, _request: Request) -> Result<Box<dyn ResponseHandle>, NetworkError> {
            self.requests.fetch_add(1, Ordering::SeqCst);

            let mut headers = http::HeaderMap::new();
            headers.insert(
                http::header::CONTENT_LENGTH,
                self.body.len().to_string().parse().unwrap(),
            );
            headers.insert(
                http::header::CONTENT_TYPE,
                self.content_type.parse().unwrap(),
            );

            Ok(Box::new(StubHandle {
                metadata: HeaderResponse::new(self.status, headers),
                remaining: StdMutex::new(Some(self.body.clone())),
            }))
        }

        fn box_clone(&self) -> Box<dyn HttpClient> {
            Box::new(self.clone())
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("chc-test-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    #[serial]
    async fn get_file_downloads_once_then_serves_from_cache() {
        let dir = scratch_dir("hit-miss");
        let client = Arc::new(StubClient {
            body: b"hello world".to_vec(),
            status: http::StatusCode::OK,
            content_type: "text/plain",
            requests: Arc::new(AtomicUsize::new(0)),
        });
        let chc = Chc::with_root(&dir, 1_000_000, client.clone() as Arc<dyn HttpClient>).unwrap();

        let path1 = chc.get_file("https://example.com/a", vec![], None).await.unwrap();
        assert_eq!(std::fs::read(&path1).unwrap(), b"hello world");
        assert_eq!(client.requests.load(Ordering::SeqCst), 1);

        let path2 = chc.get_file("https://example.com/a", vec![], None).await.unwrap();
        assert_eq!(path1, path2);
        assert_eq!(client.requests.load(Ordering::SeqCst), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    #[serial]
    async fn check_cache_forces_a_redownload() {
        let dir = scratch_dir("check-cache");
        let client = Arc::new(StubClient {
            body: b"v1".to_vec(),
            status: http::StatusCode::OK,
            content_type: "text/plain",
            requests: Arc::new(AtomicUsize::new(0)),
        });
        let chc = Chc::with_root(&dir, 1_000_000, client.clone() as Arc<dyn HttpClient>).unwrap();

        chc.get_file("https://example.com/b", vec![], None).await.unwrap();
        let reject_all: &CheckCache = &|_headers| false;
        chc.get_file("https://example.com/b", vec![], Some(reject_all))
            .await
            .unwrap();

        assert_eq!(client.requests.load(Ordering::SeqCst), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    #[serial]
    async fn get_as_json_caches_binary_form_after_first_parse() {
        let dir = scratch_dir("json");
        let client = Arc::new(StubClient {
            body: br#"{"a":1,"b":[true,null]}"#.to_vec(),
            status: http::StatusCode::OK,
            content_type: "application/json",
            requests: Arc::new(AtomicUsize::new(0)),
        });
        let chc = Chc::with_root(&dir, 1_000_000, client.clone() as Arc<dyn HttpClient>).unwrap();

        let first = chc.get_as_json("https://example.com/c.json", vec![]).await.unwrap();
        let second = chc.get_as_json("https://example.com/c.json", vec![]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.requests.load(Ordering::SeqCst), 1);
        match first {
            codec::Value::Map(pairs) => assert_eq!(pairs.len(), 2),
            other => panic!("expected a map, got {other:?}"),
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    #[serial]
    async fn download_failure_leaves_no_temp_file_behind() {
        let dir = scratch_dir("fail");
        let client = Arc::new(StubClient {
            body: Vec::new(),
            status: http::StatusCode::NOT_FOUND,
            content_type: "text/plain",
            requests: Arc::new(AtomicUsize::new(0)),
        });
        let chc = Chc::with_root(&dir, 1_000_000, client as Arc<dyn HttpClient>).unwrap();

        let key = hash_url("https://example.com/missing");
        let dest = chc.lfc().data_path(key);
        let err = chc
            .download_file("https://example.com/missing", &dest, vec![], None)
            .await
            .unwrap_err();

        assert!(matches!(err, ChcError::Http(404)));
        assert!(!dest.with_extension("p").exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
