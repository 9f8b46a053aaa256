//! # Evicting Range Cache
//!
//! Bounded disk cache of byte ranges with least-recently-used eviction.
//!
//! ## Overview
//!
//! - Ranges are keyed by `(resource, offset)` and stored one file each
//!   through the `FileSystemAccess` bridge
//! - A write that would exceed capacity evicts the oldest-accessed ranges
//!   first; ties go to the smaller resource id, then the smaller offset
//! - A write larger than the whole cache is refused and changes nothing
//! - `clear_all` is a barrier: writes that started before it are discarded
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │     EvictingCache                      │
//! │  - put() / put_in_generation()         │
//! │  - get() / contains_range()            │
//! │  - clear_all() / stats()               │
//! └────────┬───────────────────────────────┘
//!          │
//!          ├──> RangeIndex (entries + recency order)
//!          ├──> FileSystemAccess (range files)
//!          ├──> Clock (access timestamps)
//!          └──> EventBus (optional CacheEvents)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_playback::cache::{CacheConfig, EvictingCache};
//!
//! let cache = EvictingCache::open(CacheConfig::new(10), fs, clock).await?;
//! cache.put(&a, 0, Bytes::from(vec![0u8; 6])).await?;
//! cache.put(&b, 0, Bytes::from(vec![1u8; 6])).await?; // evicts `a`
//! assert!(cache.get(&a, 0, 6).await.is_none());
//! assert_eq!(cache.occupied_bytes(), 6);
//! ```

pub mod config;
mod index;
pub mod stats;
mod store;

pub use config::CacheConfig;
pub use index::CacheEntry;
pub use stats::CacheStats;
pub use store::EvictingCache;
