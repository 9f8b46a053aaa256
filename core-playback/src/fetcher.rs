//! # Range Fetcher
//!
//! Bounded, cancellable byte-range reads of remote resources.
//!
//! A fetch issues one ranged GET, buffers the streamed body and stores it
//! with a single cache `put`, so a cancelled or failed transfer never leaves
//! a partial entry. Cancellation is observed while waiting for headers and
//! at every body read.

use crate::cache::EvictingCache;
use crate::error::FetchError;
use crate::types::ResourceId;
use bridge_traits::http::{DynAsyncRead, HttpClient, HttpRequest, StreamingResponse};
use bytes::{Bytes, BytesMut};
use core_async::io::AsyncReadExt;
use core_async::sync::CancellationToken;
use core_async::time::timeout;
use core_runtime::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use core_runtime::logging::redact_url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Size of each individual body read.
const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Timeouts applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Bound on waiting for response headers.
    pub connect_timeout: Duration,
    /// Bound on each single body read.
    pub read_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be greater than 0".to_string());
        }
        if self.read_timeout.is_zero() {
            return Err("read_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Reads byte ranges over HTTP and stores them in the shared cache.
pub struct RangeFetcher {
    http_client: Arc<dyn HttpClient>,
    cache: Arc<EvictingCache>,
    config: FetchConfig,
}

impl RangeFetcher {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        cache: Arc<EvictingCache>,
        config: FetchConfig,
    ) -> Self {
        Self {
            http_client,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<EvictingCache> {
        &self.cache
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch `[offset, offset + length)` into the cache.
    ///
    /// Returns the number of bytes stored by this call: `0` when the range
    /// was already cached or the resource has no bytes there, fewer than
    /// `length` when the resource ends early.
    #[instrument(skip(self, cancel), fields(url = %redact_url(resource.as_str())))]
    pub async fn fetch(
        &self,
        resource: &ResourceId,
        offset: u64,
        length: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if length == 0 {
            return Ok(0);
        }

        let generation = self.cache.generation();
        if self.cache.contains_range(resource, offset, length).await {
            debug!("Range already cached");
            return Ok(0);
        }

        let data = self.read_range(resource, offset, length, cancel).await?;
        if data.is_empty() {
            return Ok(0);
        }
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let written = data.len() as u64;
        self.cache
            .put_in_generation(resource, offset, data, generation)
            .await?;
        debug!(bytes = written, "Range fetched");
        Ok(written)
    }

    /// Read `[offset, offset + length)` from the network without caching.
    pub async fn read_range(
        &self,
        resource: &ResourceId,
        offset: u64,
        length: u64,
        cancel: &CancellationToken,
    ) -> Result<Bytes, FetchError> {
        if length == 0 {
            return Ok(Bytes::new());
        }

        let request = HttpRequest::get(resource.as_str())
            .range(offset, length)
            .timeout(self.config.connect_timeout);
        let response = self.connect(request, cancel).await?;
        check_range_response(&response, offset)?;

        self.read_body(response.body, 0, length, cancel).await
    }

    /// Plain GET that discards `offset` bytes and keeps the next `length`.
    ///
    /// Used when the origin does not honour `Range`.
    pub async fn read_full_and_slice(
        &self,
        resource: &ResourceId,
        offset: u64,
        length: u64,
        cancel: &CancellationToken,
    ) -> Result<Bytes, FetchError> {
        if length == 0 {
            return Ok(Bytes::new());
        }

        let request = HttpRequest::get(resource.as_str()).timeout(self.config.connect_timeout);
        let response = self.connect(request, cancel).await?;
        if !response.is_success() {
            return Err(FetchError::Network(format!(
                "unexpected status {} for {}",
                response.status,
                redact_url(resource.as_str())
            )));
        }

        self.read_body(response.body, offset, length, cancel).await
    }

    async fn connect(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<StreamingResponse, FetchError> {
        let connect_timeout = self.config.connect_timeout;
        core_async::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = timeout(connect_timeout, self.http_client.execute_streaming(request)) => {
                match result {
                    Ok(Ok(response)) => Ok(response),
                    Ok(Err(e)) => Err(FetchError::Network(e.to_string())),
                    Err(_) => Err(FetchError::Network(format!(
                        "no response within {:?}",
                        connect_timeout
                    ))),
                }
            }
        }
    }

    /// Skip `skip` bytes, then buffer up to `length` bytes or until EOF.
    async fn read_body(
        &self,
        mut body: Box<DynAsyncRead>,
        skip: u64,
        length: u64,
        cancel: &CancellationToken,
    ) -> Result<Bytes, FetchError> {
        let read_timeout = self.config.read_timeout;
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        let mut skipped = 0u64;
        let mut buf = BytesMut::with_capacity(length.min(READ_CHUNK_BYTES as u64 * 16) as usize);

        while (buf.len() as u64) < length {
            let want = if skipped < skip {
                (skip - skipped).min(READ_CHUNK_BYTES as u64) as usize
            } else {
                (length - buf.len() as u64).min(READ_CHUNK_BYTES as u64) as usize
            };

            let n = core_async::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = timeout(read_timeout, body.read(&mut chunk[..want])) => match result {
                    Ok(Ok(n)) => n,
                    Ok(Err(e)) => return Err(FetchError::Network(e.to_string())),
                    Err(_) => {
                        return Err(FetchError::Network(format!(
                            "no data within {:?}",
                            read_timeout
                        )))
                    }
                },
            };

            if n == 0 {
                break;
            }
            if skipped < skip {
                skipped += n as u64;
            } else {
                buf.extend_from_slice(&chunk[..n]);
            }
        }

        if (buf.len() as u64) < length {
            debug!(requested = length, received = buf.len(), "Resource ended before range end");
        }
        Ok(buf.freeze())
    }
}

/// Map a ranged response onto the fetch error taxonomy.
fn check_range_response(response: &StreamingResponse, offset: u64) -> Result<(), FetchError> {
    match response.status {
        206 => match response.content_range() {
            Some(range) if range.start != offset => Err(FetchError::RangeUnsupported(format!(
                "asked for offset {}, got {}",
                offset, range.start
            ))),
            Some(_) => Ok(()),
            None => {
                warn!("Partial response without Content-Range");
                Ok(())
            }
        },
        200 if offset == 0 => Ok(()),
        200 => Err(FetchError::RangeUnsupported(
            "origin ignored the Range header".to_string(),
        )),
        416 => Err(FetchError::RangeUnsupported(
            "range not satisfiable".to_string(),
        )),
        status => Err(FetchError::Network(format!("unexpected status {}", status))),
    }
}
