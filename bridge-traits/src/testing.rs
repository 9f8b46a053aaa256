//! In-memory bridge implementations for tests.
//!
//! Enabled with the `test-utils` feature. Nothing here touches the network or
//! the real filesystem.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use core_async::io::AsyncWriteExt;

use crate::error::{BridgeError, Result};
use crate::http::{HttpClient, HttpRequest, StreamingResponse};
use crate::storage::{FileMetadata, FileSystemAccess};
use crate::time::Clock;

// ============================================================================
// Clock
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_millis),
        }
    }

    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance_millis(&self, delta: i64) {
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.millis.load(Ordering::SeqCst))
            .single()
            .unwrap_or_default()
    }
}

// ============================================================================
// File system
// ============================================================================

/// Flat map of path to contents; directories are implied by file prefixes
/// plus any explicitly created ones.
#[derive(Debug)]
pub struct InMemoryFileSystem {
    root: PathBuf,
    files: Mutex<BTreeMap<PathBuf, Bytes>>,
    dirs: Mutex<Vec<PathBuf>>,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    fail_dir_deletes: AtomicBool,
}

impl InMemoryFileSystem {
    pub fn new() -> Self {
        Self::with_root("/cache")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: Mutex::new(BTreeMap::new()),
            dirs: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            fail_dir_deletes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `write_file` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent delete fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make `delete_dir_all` fail as if a file appeared mid-delete, while
    /// single-file deletes keep working.
    pub fn fail_dir_deletes(&self, fail: bool) {
        self.fail_dir_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.lock().keys().cloned().collect()
    }

    pub fn stored_bytes(&self) -> u64 {
        self.files.lock().values().map(|b| b.len() as u64).sum()
    }

    /// Overwrite a file behind the cache's back.
    pub fn corrupt(&self, path: &Path, data: Bytes) {
        self.files.lock().insert(path.to_path_buf(), data);
    }

    fn not_found(path: &Path) -> BridgeError {
        BridgeError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        ))
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.lock().iter().any(|d| d.starts_with(path))
            || self
                .files
                .lock()
                .keys()
                .any(|f| f != path && f.starts_with(path))
    }
}

impl Default for InMemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for InMemoryFileSystem {
    async fn get_cache_directory(&self) -> Result<PathBuf> {
        Ok(self.root.clone())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.files.lock().contains_key(path) || self.is_dir(path))
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        if let Some(data) = self.files.lock().get(path) {
            return Ok(FileMetadata {
                size: data.len() as u64,
                modified_at: None,
                is_directory: false,
            });
        }
        if self.is_dir(path) {
            return Ok(FileMetadata {
                size: 0,
                modified_at: None,
                is_directory: true,
            });
        }
        Err(Self::not_found(path))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.dirs.lock().push(path.to_path_buf());
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| Self::not_found(path))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("disk full".to_string()));
        }
        self.files.lock().insert(path.to_path_buf(), data);
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut files = self.files.lock();
        let data = files.remove(from).ok_or_else(|| Self::not_found(from))?;
        files.insert(to.to_path_buf(), data);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("permission denied".to_string()));
        }
        self.files
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(path))
    }

    async fn delete_dir_all(&self, path: &Path) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("permission denied".to_string()));
        }
        if self.fail_dir_deletes.load(Ordering::SeqCst) {
            return Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{}: directory not empty", path.display()),
            )));
        }
        self.files.lock().retain(|f, _| !f.starts_with(path));
        self.dirs.lock().retain(|d| !d.starts_with(path));
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut children: Vec<PathBuf> = Vec::new();
        let mut push_child = |candidate: &Path| {
            if let Ok(rest) = candidate.strip_prefix(path) {
                if let Some(first) = rest.components().next() {
                    let child = path.join(first);
                    if !children.contains(&child) {
                        children.push(child);
                    }
                }
            }
        };
        for file in self.files.lock().keys() {
            push_child(file);
        }
        for dir in self.dirs.lock().iter() {
            push_child(dir);
        }
        children.sort();
        Ok(children)
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// How a fake origin answers requests for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBehavior {
    /// 206 with the requested slice, 416 past the end.
    Honour,
    /// 200 with the full body regardless of `Range`.
    Ignore,
    /// Always answer with this status and an empty body.
    Status(u16),
    /// Fail before any response arrives.
    ConnectionRefused,
}

#[derive(Debug, Clone)]
struct FakeResource {
    data: Bytes,
    behavior: RangeBehavior,
    /// Stop sending (without closing) once this many body bytes went out.
    stall_after: Option<usize>,
}

/// Serves byte ranges of registered resources from memory.
///
/// Bodies are streamed through a duplex pipe in `chunk_size` pieces, so
/// readers observe multiple reads per response.
#[derive(Debug, Clone)]
pub struct InMemoryHttpClient {
    resources: Arc<Mutex<HashMap<String, FakeResource>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    chunk_size: usize,
}

impl InMemoryHttpClient {
    pub fn new() -> Self {
        Self {
            resources: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            chunk_size: 4096,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn insert(&self, url: impl Into<String>, data: impl Into<Bytes>) {
        self.resources.lock().insert(
            url.into(),
            FakeResource {
                data: data.into(),
                behavior: RangeBehavior::Honour,
                stall_after: None,
            },
        );
    }

    pub fn set_behavior(&self, url: &str, behavior: RangeBehavior) {
        if let Some(resource) = self.resources.lock().get_mut(url) {
            resource.behavior = behavior;
        }
    }

    pub fn stall_after(&self, url: &str, bytes: usize) {
        if let Some(resource) = self.resources.lock().get_mut(url) {
            resource.stall_after = Some(bytes);
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.url == url).count()
    }

    fn parse_range(request: &HttpRequest) -> Option<(u64, Option<u64>)> {
        let value = request.headers.get("Range")?;
        let span = value.strip_prefix("bytes=")?;
        let (start, end) = span.split_once('-')?;
        let start = start.parse().ok()?;
        let end = if end.is_empty() { None } else { Some(end.parse().ok()?) };
        Some((start, end))
    }

    fn stream_body(&self, body: Bytes, stall_after: Option<usize>) -> Box<crate::http::DynAsyncRead> {
        let chunk_size = self.chunk_size;
        let (mut writer, reader) = core_async::io::duplex(chunk_size.max(64));
        core_async::task::spawn(async move {
            let limit = stall_after.unwrap_or(body.len()).min(body.len());
            for chunk in body[..limit].chunks(chunk_size) {
                if writer.write_all(chunk).await.is_err() {
                    return;
                }
            }
            if stall_after.is_some() {
                std::future::pending::<()>().await;
            }
        });
        Box::new(reader)
    }
}

impl Default for InMemoryHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for InMemoryHttpClient {
    async fn execute_streaming(&self, request: HttpRequest) -> Result<StreamingResponse> {
        self.requests.lock().push(request.clone());
        let resource = self.resources.lock().get(&request.url).cloned();
        let Some(resource) = resource else {
            return Ok(StreamingResponse {
                status: 404,
                headers: HashMap::new(),
                content_length: Some(0),
                body: Box::new(core_async::io::empty()),
            });
        };

        let total = resource.data.len() as u64;
        let mut headers = HashMap::new();
        match resource.behavior {
            RangeBehavior::ConnectionRefused => Err(BridgeError::OperationFailed(format!(
                "connection refused: {}",
                request.url
            ))),
            RangeBehavior::Status(status) => Ok(StreamingResponse {
                status,
                headers,
                content_length: Some(0),
                body: Box::new(core_async::io::empty()),
            }),
            RangeBehavior::Ignore => Ok(StreamingResponse {
                status: 200,
                headers,
                content_length: Some(total),
                body: self.stream_body(resource.data, resource.stall_after),
            }),
            RangeBehavior::Honour => match Self::parse_range(&request) {
                None => Ok(StreamingResponse {
                    status: 200,
                    headers,
                    content_length: Some(total),
                    body: self.stream_body(resource.data, resource.stall_after),
                }),
                Some((start, _)) if start >= total => {
                    headers.insert("content-range".to_string(), format!("bytes */{}", total));
                    Ok(StreamingResponse {
                        status: 416,
                        headers,
                        content_length: Some(0),
                        body: Box::new(core_async::io::empty()),
                    })
                }
                Some((start, end)) => {
                    let end = end.unwrap_or(total - 1).min(total - 1);
                    let slice = resource.data.slice(start as usize..=end as usize);
                    headers.insert(
                        "content-range".to_string(),
                        format!("bytes {}-{}/{}", start, end, total),
                    );
                    Ok(StreamingResponse {
                        status: 206,
                        headers,
                        content_length: Some(slice.len() as u64),
                        body: self.stream_body(slice, resource.stall_after),
                    })
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_async::io::AsyncReadExt;

    #[tokio::test]
    async fn test_in_memory_fs_rename_and_list() {
        let fs = InMemoryFileSystem::new();
        let dir = fs.get_cache_directory().await.unwrap().join("abc");
        fs.write_file(&dir.join("0-4.bin.tmp"), Bytes::from_static(b"data"))
            .await
            .unwrap();
        fs.rename(&dir.join("0-4.bin.tmp"), &dir.join("0-4.bin"))
            .await
            .unwrap();

        assert_eq!(fs.list_directory(Path::new("/cache")).await.unwrap(), vec![dir.clone()]);
        assert_eq!(fs.directory_size(Path::new("/cache")).await.unwrap(), 4);
        assert!(fs.exists(&dir.join("0-4.bin")).await.unwrap());
        assert!(!fs.exists(&dir.join("0-4.bin.tmp")).await.unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_http_serves_ranges() {
        let client = InMemoryHttpClient::new().with_chunk_size(3);
        client.insert("https://cdn.test/a", Bytes::from_static(b"0123456789"));

        let mut response = client
            .execute_streaming(HttpRequest::get("https://cdn.test/a").range(2, 5))
            .await
            .unwrap();
        let mut body = Vec::new();
        response.body.read_to_end(&mut body).await.unwrap();

        assert_eq!(response.status, 206);
        assert_eq!(body, b"23456");
        assert_eq!(client.request_count("https://cdn.test/a"), 1);
    }

    #[tokio::test]
    async fn test_in_memory_http_past_end_is_416() {
        let client = InMemoryHttpClient::new();
        client.insert("https://cdn.test/a", Bytes::from_static(b"0123"));

        let response = client
            .execute_streaming(HttpRequest::get("https://cdn.test/a").range(10, 5))
            .await
            .unwrap();
        assert!(response.is_range_not_satisfiable());
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance_millis(500);
        assert_eq!(clock.unix_timestamp_millis(), 1_500);
    }
}
