//! # Prefetch & Cache Module
//!
//! Keeps sequential media playback smooth by serving bytes from a bounded
//! disk cache and warming the neighbours of the current item ahead of time.
//!
//! ## Overview
//!
//! This module handles:
//! - [`EvictingCache`]: byte ranges on disk with least-recently-used eviction
//! - [`RangeFetcher`]: cancellable HTTP range reads into the cache
//! - [`PrefetchScheduler`]: the sliding prefetch window around the cursor
//! - [`PlaybackSource`]: cache-first reads for the player
//!
//! ## Usage
//!
//! ```rust,ignore
//! let cache = Arc::new(EvictingCache::open(config.cache_config(), fs, clock).await?);
//! let fetcher = Arc::new(RangeFetcher::new(http, cache, config.fetch_config()));
//! let scheduler = PrefetchScheduler::new(playlist.clone(), fetcher.clone(), config.prefetch_config())?;
//! let source = PlaybackSource::new(playlist, fetcher);
//!
//! scheduler.on_cursor_changed(5).await?; // warms 2, 3, 4, 6, 7, 8
//! let head = source.request_bytes(5, 0, 64 * 1024).await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod playlist;
pub mod scheduler;
pub mod source;
pub mod types;

pub use cache::{CacheConfig, CacheEntry, CacheStats, EvictingCache};
pub use config::PlaybackConfig;
pub use error::{CacheError, FetchError, PlaybackError, Result};
pub use fetcher::{FetchConfig, RangeFetcher};
pub use playlist::{Playlist, PlaylistEntry};
pub use scheduler::{
    desired_window, PrefetchConfig, PrefetchScheduler, TaskSnapshot, TaskState, WindowUpdate,
};
pub use source::PlaybackSource;
pub use types::{ByteRange, ResourceId};
