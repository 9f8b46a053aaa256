//! HTTP Client Abstraction
//!
//! Streaming HTTP with byte-range support. Media bodies are never buffered by
//! the bridge; callers drain the returned reader themselves so they can stop
//! (and observe cancellation) between reads.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Boxed streaming body.
pub type DynAsyncRead = dyn core_async::io::AsyncRead + Send + Unpin;

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    /// Upper bound on the time until response headers arrive.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Request `[offset, offset + length)` via an inclusive `Range` header.
    ///
    /// A zero length leaves the request unranged.
    pub fn range(self, offset: u64, length: u64) -> Self {
        if length == 0 {
            return self;
        }
        let last = offset.saturating_add(length - 1);
        self.header("Range", format!("bytes={}-{}", offset, last))
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Parsed `Content-Range: bytes start-end/total` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    /// Inclusive.
    pub end: u64,
    /// `None` when the server sent `*`.
    pub total: Option<u64>,
}

impl ContentRange {
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (span, total) = rest.split_once('/')?;
        let (start, end) = span.split_once('-')?;
        let start = start.trim().parse().ok()?;
        let end = end.trim().parse().ok()?;
        if end < start {
            return None;
        }
        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse().ok()?),
        };
        Some(Self { start, end, total })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Response whose body is still on the wire.
pub struct StreamingResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub content_length: Option<u64>,
    pub body: Box<DynAsyncRead>,
}

impl StreamingResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_range(&self) -> Option<ContentRange> {
        self.header("content-range").and_then(ContentRange::parse)
    }

    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 206: the server honoured the `Range` header.
    pub fn is_partial_content(&self) -> bool {
        self.status == 206
    }

    /// 416: the requested range lies outside the resource.
    pub fn is_range_not_satisfiable(&self) -> bool {
        self.status == 416
    }

    /// Check if response status indicates a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

impl fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// `url` without its query string or fragment.
///
/// Signed CDN links carry their credentials in the query; anything that ends
/// up in a log line or error message goes through this first.
pub fn redact_url(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Async HTTP client trait
///
/// Implementations should:
/// - honour `HttpRequest::timeout` as the bound on connection plus headers
/// - follow redirects, including http/https protocol switches
/// - map elapsed timeouts to [`BridgeError::Timeout`]
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// async fn supports_ranges(client: &dyn HttpClient, url: &str) -> Result<bool> {
///     let response = client.execute_streaming(HttpRequest::get(url).range(0, 1)).await?;
///     Ok(response.is_partial_content())
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send a request and return as soon as the response headers arrive.
    ///
    /// Non-2xx statuses are returned as responses, not errors, so callers can
    /// distinguish `206`/`200`/`416`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network connection fails
    /// - TLS validation fails
    /// - The header timeout elapses
    async fn execute_streaming(&self, request: HttpRequest) -> Result<StreamingResponse>;

    /// Download a whole resource as a stream of bytes.
    async fn download_stream(&self, url: String) -> Result<Box<DynAsyncRead>> {
        let response = self.execute_streaming(HttpRequest::get(url.clone())).await?;
        if !response.is_success() {
            return Err(BridgeError::OperationFailed(format!(
                "GET {} returned HTTP {}",
                redact_url(&url),
                response.status
            )));
        }
        Ok(response.body)
    }

    /// Check network connectivity
    async fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("https://cdn.example.com/v/1.mp4?Expires=1&Signature=abc"),
            "https://cdn.example.com/v/1.mp4"
        );
        assert_eq!(
            redact_url("https://cdn.example.com/v/1.mp4#t=10"),
            "https://cdn.example.com/v/1.mp4"
        );
        assert_eq!(redact_url("https://a/b.mp4"), "https://a/b.mp4");
    }

    #[test]
    fn test_range_header_is_inclusive() {
        let request = HttpRequest::get("https://cdn.example.com/a.mp4")
            .range(0, 1_048_576)
            .timeout(Duration::from_secs(10));

        assert_eq!(
            request.headers.get("Range"),
            Some(&"bytes=0-1048575".to_string())
        );
        assert_eq!(request.timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_zero_length_range_is_unranged() {
        let request = HttpRequest::get("https://cdn.example.com/a.mp4").range(10, 0);
        assert!(!request.headers.contains_key("Range"));
    }

    #[test]
    fn test_content_range_parsing() {
        let range = ContentRange::parse("bytes 100-199/5000").unwrap();
        assert_eq!(range.start, 100);
        assert_eq!(range.end, 199);
        assert_eq!(range.total, Some(5000));
        assert_eq!(range.len(), 100);

        let open = ContentRange::parse("bytes 0-9/*").unwrap();
        assert_eq!(open.total, None);

        assert!(ContentRange::parse("bytes */5000").is_none());
        assert!(ContentRange::parse("bytes 9-0/10").is_none());
        assert!(ContentRange::parse("items 0-9/10").is_none());
    }

    #[test]
    fn test_streaming_response_status_checks() {
        let mut headers = HashMap::new();
        headers.insert("content-range".to_string(), "bytes 0-3/10".to_string());
        let response = StreamingResponse {
            status: 206,
            headers,
            content_length: Some(4),
            body: Box::new(core_async::io::empty()),
        };

        assert!(response.is_success());
        assert!(response.is_partial_content());
        assert!(!response.is_server_error());
        assert_eq!(response.header("Content-Range"), Some("bytes 0-3/10"));
        assert_eq!(response.content_range().map(|r| r.len()), Some(4));
    }
}
