//! # Playback Session
//!
//! What the player UI talks to: item transitions drive the prefetch window,
//! the player reads bytes through the cache, and the cache-size label and
//! "clear cache" button map onto [`PlaybackSession::cache_size_label`] and
//! [`PlaybackSession::clear_cache`].

use crate::error::{CoreError, Result};
use crate::CoreDependencies;
use bytes::Bytes;
use core_async::sync::CancellationToken;
use core_playback::{
    CacheStats, EvictingCache, PlaybackConfig, PlaybackSource, Playlist, PrefetchScheduler,
    RangeFetcher, WindowUpdate,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream, PrefetchEvent, Receiver};
use core_runtime::CoreEvent;
use std::sync::Arc;
use tracing::{info, instrument};

/// One playlist being played, with its cache and prefetch window.
pub struct PlaybackSession {
    playlist: Arc<Playlist>,
    cache: Arc<EvictingCache>,
    scheduler: PrefetchScheduler,
    source: PlaybackSource,
    event_bus: EventBus,
}

impl PlaybackSession {
    pub(crate) async fn open(
        config: &CoreConfig,
        deps: &CoreDependencies,
        event_bus: EventBus,
        playlist: Playlist,
    ) -> Result<Self> {
        let playback = PlaybackConfig::from_core_config(config);
        playback.validate().map_err(CoreError::InitializationFailed)?;

        let cache = Arc::new(
            EvictingCache::open(
                playback.cache_config(),
                Arc::clone(&deps.filesystem),
                Arc::clone(&deps.clock),
            )
            .await?
            .with_event_bus(event_bus.clone()),
        );
        let fetcher = Arc::new(RangeFetcher::new(
            Arc::clone(&deps.http_client),
            Arc::clone(&cache),
            playback.fetch_config(),
        ));

        let playlist = Arc::new(playlist);
        let scheduler = PrefetchScheduler::new(
            Arc::clone(&playlist),
            Arc::clone(&fetcher),
            playback.prefetch_config(),
        )?
        .with_event_bus(event_bus.clone());
        let source = PlaybackSource::new(Arc::clone(&playlist), fetcher)
            .with_cache_on_demand(playback.cache_on_demand);

        Ok(Self {
            playlist,
            cache,
            scheduler,
            source,
            event_bus,
        })
    }

    pub fn playlist(&self) -> &Arc<Playlist> {
        &self.playlist
    }

    pub fn scheduler(&self) -> &PrefetchScheduler {
        &self.scheduler
    }

    pub fn cache(&self) -> &Arc<EvictingCache> {
        &self.cache
    }

    /// The player moved to `index`; re-centre the prefetch window on it.
    #[instrument(skip(self))]
    pub async fn on_item_transition(&self, index: usize) -> Result<WindowUpdate> {
        Ok(self.scheduler.on_cursor_changed(index).await?)
    }

    /// Bytes for the player, cache first.
    pub async fn request_bytes(&self, index: usize, offset: u64, length: u64) -> Result<Bytes> {
        Ok(self.source.request_bytes(index, offset, length).await?)
    }

    /// As [`request_bytes`](Self::request_bytes), abandoned when `cancel` fires.
    pub async fn request_bytes_with_cancel(
        &self,
        index: usize,
        offset: u64,
        length: u64,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        Ok(self
            .source
            .request_bytes_with_cancel(index, offset, length, cancel)
            .await?)
    }

    pub fn occupied_bytes(&self) -> u64 {
        self.cache.occupied_bytes()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Text for the cache-size label, whole mebibytes rounded down.
    pub fn cache_size_label(&self) -> String {
        cache_size_label(self.occupied_bytes())
    }

    /// Drop every cached range, then resume prefetching around the cursor.
    ///
    /// A storage failure is returned after prefetching has resumed.
    #[instrument(skip(self))]
    pub async fn clear_cache(&self) -> Result<()> {
        self.scheduler.clear_cache().await?;
        info!(label = %self.cache_size_label(), "Cache cleared");
        Ok(())
    }

    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// Events after which [`cache_size_label`](Self::cache_size_label) may
    /// read differently.
    pub fn occupancy_events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe()).filter(|event| {
            matches!(
                event,
                CoreEvent::Cache(_) | CoreEvent::Prefetch(PrefetchEvent::TaskCompleted { .. })
            )
        })
    }

    /// Cancel all prefetching and wait for the tasks to exit.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("items", &self.playlist.len())
            .field("occupied_bytes", &self.occupied_bytes())
            .finish_non_exhaustive()
    }
}

fn cache_size_label(occupied_bytes: u64) -> String {
    format!("Cache: {} MB", occupied_bytes / (1024 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_size_label_rounds_down() {
        assert_eq!(cache_size_label(0), "Cache: 0 MB");
        assert_eq!(cache_size_label(1024 * 1024 - 1), "Cache: 0 MB");
        assert_eq!(cache_size_label(5 * 1024 * 1024 + 17), "Cache: 5 MB");
    }
}
