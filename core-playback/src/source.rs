//! Cache-first byte source for the player.

use crate::error::{FetchError, PlaybackError, Result};
use crate::fetcher::RangeFetcher;
use crate::playlist::Playlist;
use crate::types::ResourceId;
use bytes::Bytes;
use core_async::sync::CancellationToken;
use core_runtime::logging::redact_url;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Serves `request_bytes` from the cache, falling through to the network.
///
/// Direct fetches are not limited by the prefetch budget.
pub struct PlaybackSource {
    playlist: Arc<Playlist>,
    fetcher: Arc<RangeFetcher>,
    cache_on_demand: bool,
}

impl PlaybackSource {
    pub fn new(playlist: Arc<Playlist>, fetcher: Arc<RangeFetcher>) -> Self {
        Self {
            playlist,
            fetcher,
            cache_on_demand: true,
        }
    }

    /// Store bytes fetched on a miss in the cache (best effort).
    pub fn with_cache_on_demand(mut self, enabled: bool) -> Self {
        self.cache_on_demand = enabled;
        self
    }

    pub fn playlist(&self) -> &Arc<Playlist> {
        &self.playlist
    }

    pub async fn request_bytes(&self, index: usize, offset: u64, length: u64) -> Result<Bytes> {
        self.request_bytes_with_cancel(index, offset, length, &CancellationToken::new())
            .await
    }

    /// Bytes `[offset, offset + length)` of item `index`.
    ///
    /// Returns fewer bytes than requested if the resource ends first.
    #[instrument(skip(self, cancel))]
    pub async fn request_bytes_with_cancel(
        &self,
        index: usize,
        offset: u64,
        length: u64,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let resource = self.resource(index)?;
        if length == 0 {
            return Ok(Bytes::new());
        }

        let cache = self.fetcher.cache();
        if let Some(bytes) = cache.get(&resource, offset, length).await {
            debug!("Served from cache");
            return Ok(bytes);
        }

        let generation = cache.generation();
        let data = match self
            .fetcher
            .read_range(&resource, offset, length, cancel)
            .await
        {
            Err(FetchError::RangeUnsupported(reason)) => {
                debug!(
                    url = %redact_url(resource.as_str()),
                    reason = %reason,
                    "Falling back to a full download"
                );
                self.fetcher
                    .read_full_and_slice(&resource, offset, length, cancel)
                    .await?
            }
            other => other?,
        };

        if self.cache_on_demand && !data.is_empty() {
            if let Err(e) = cache
                .put_in_generation(&resource, offset, data.clone(), generation)
                .await
            {
                warn!(error = %e, "Could not cache fetched bytes");
            }
        }

        Ok(data)
    }

    /// Whether the range is already fully cached.
    pub async fn is_cached(&self, index: usize, offset: u64, length: u64) -> Result<bool> {
        let resource = self.resource(index)?;
        Ok(self
            .fetcher
            .cache()
            .contains_range(&resource, offset, length)
            .await)
    }

    fn resource(&self, index: usize) -> Result<ResourceId> {
        self.playlist
            .resource(index)
            .cloned()
            .ok_or(PlaybackError::IndexOutOfRange {
                index,
                len: self.playlist.len(),
            })
    }
}
