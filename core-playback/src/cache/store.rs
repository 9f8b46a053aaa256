//! # Evicting Cache
//!
//! Bounded on-disk store of byte ranges keyed by `(resource, offset)`.
//!
//! Each range lives in its own file at
//! `<root>/<sha256(resource)>/<offset>.bin`. Writes land in a temporary
//! file first and are renamed into place while the bookkeeping lock is held,
//! so a range is either fully visible or absent.

use super::config::CacheConfig;
use super::index::{CacheEntry, RangeIndex, Segment};
use super::stats::CacheStats;
use crate::error::{CacheError, PlaybackError, Result};
use crate::types::ResourceId;
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use bytes::{Bytes, BytesMut};
use core_async::sync::Mutex;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use core_runtime::logging::{redact_url, strip_path};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    rejected_writes: u64,
}

#[derive(Debug)]
struct CacheState {
    index: RangeIndex,
    counters: Counters,
}

/// Byte-range cache with least-recently-used eviction.
///
/// All bookkeeping is serialised under one async mutex; the instance is
/// meant to be shared behind an `Arc` and is never swapped out, `clear_all`
/// resets it in place.
pub struct EvictingCache {
    config: CacheConfig,
    fs: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    root: PathBuf,
    state: Mutex<CacheState>,
    /// Mirrors `index.occupied()` for lock-free reads from the UI.
    occupied: AtomicU64,
    generation: AtomicU64,
    event_bus: Option<EventBus>,
}

impl EvictingCache {
    /// Open the cache below the host cache directory.
    ///
    /// Range files from a previous run have no index entry, so the ranges
    /// directory is wiped.
    #[instrument(skip(fs, clock))]
    pub async fn open(
        config: CacheConfig,
        fs: Arc<dyn FileSystemAccess>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate().map_err(PlaybackError::InvalidConfig)?;

        let root = fs
            .get_cache_directory()
            .await
            .map_err(CacheError::from)?
            .join(&config.ranges_directory);

        if fs.exists(&root).await.map_err(CacheError::from)? {
            fs.delete_dir_all(&root).await.map_err(CacheError::from)?;
            debug!(path = ?root, "Removed stale range files");
        }
        fs.create_dir_all(&root).await.map_err(CacheError::from)?;

        info!(
            path = ?root,
            capacity_bytes = config.capacity_bytes,
            "Cache opened"
        );

        Ok(Self {
            state: Mutex::new(CacheState {
                index: RangeIndex::new(config.capacity_bytes),
                counters: Counters::default(),
            }),
            config,
            fs,
            clock,
            root,
            occupied: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            event_bus: None,
        })
    }

    /// Publish eviction, rejection and clear events on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.config.capacity_bytes
    }

    pub fn occupied_bytes(&self) -> u64 {
        self.occupied.load(Ordering::Acquire)
    }

    /// Number of `clear_all` calls so far. Writers capture this before they
    /// start so a clear in between discards their result.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `data` at `offset`, evicting least-recently-used ranges as needed.
    pub async fn put(&self, resource: &ResourceId, offset: u64, data: Bytes) -> std::result::Result<(), CacheError> {
        self.put_in_generation(resource, offset, data, self.generation())
            .await
    }

    /// Like [`put`](Self::put) but rejected with [`CacheError::Invalidated`]
    /// if `clear_all` ran since `generation` was read.
    #[instrument(skip(self, data), fields(url = %redact_url(resource.as_str()), length = data.len()))]
    pub async fn put_in_generation(
        &self,
        resource: &ResourceId,
        offset: u64,
        data: Bytes,
        generation: u64,
    ) -> std::result::Result<(), CacheError> {
        let length = data.len() as u64;
        if length == 0 {
            return Ok(());
        }
        if offset.checked_add(length).is_none() {
            return Err(CacheError::RangeOverflow { offset, length });
        }
        if length > self.config.capacity_bytes {
            self.state.lock().await.counters.rejected_writes += 1;
            warn!(
                requested = length,
                capacity = self.config.capacity_bytes,
                "Range exceeds cache capacity"
            );
            self.emit(CacheEvent::WriteRejected {
                resource_id: resource.to_string(),
                requested: length,
                capacity: self.config.capacity_bytes,
            });
            return Err(CacheError::CapacityUnavailable {
                requested: length,
                capacity: self.config.capacity_bytes,
            });
        }

        let final_path = self.entry_path(resource, offset);
        let tmp_path = final_path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        if let Err(e) = self.fs.write_file(&tmp_path, data).await {
            self.discard(&tmp_path).await;
            return Err(e.into());
        }

        let mut state = self.state.lock().await;
        if self.generation() != generation {
            drop(state);
            self.discard(&tmp_path).await;
            debug!("Discarding write from before the last clear");
            return Err(CacheError::Invalidated);
        }

        let plan = match state.index.plan_insert(resource, offset, length) {
            Ok(plan) => plan,
            Err(e) => {
                drop(state);
                self.discard(&tmp_path).await;
                return Err(e);
            }
        };

        if let Err(e) = self.fs.rename(&tmp_path, &final_path).await {
            drop(state);
            self.discard(&tmp_path).await;
            return Err(e.into());
        }

        for victim in &plan.victims {
            let path = self.entry_path(&victim.resource_id, victim.offset);
            if let Err(e) = self.fs.delete_file(&path).await {
                // The index forgets the entry either way; the file goes with the next clear.
                let path = path.to_string_lossy();
                warn!(file = strip_path(&path), error = %e, "Failed to delete evicted range");
            }
        }

        let now = self.clock.unix_timestamp_millis();
        state
            .index
            .commit_insert(&plan, resource, offset, length, now);
        state.counters.evictions += plan.victims.len() as u64;
        self.occupied.store(state.index.occupied(), Ordering::Release);
        drop(state);

        for victim in plan.victims {
            debug!(
                url = %redact_url(victim.resource_id.as_str()),
                offset = victim.offset,
                length = victim.length,
                "Evicted range"
            );
            self.emit(CacheEvent::Evicted {
                resource_id: victim.resource_id.to_string(),
                offset: victim.offset,
                length: victim.length,
            });
        }
        debug!(offset, "Stored range");

        Ok(())
    }

    /// Bytes of `[offset, offset + length)` if fully cached.
    ///
    /// Every entry read is marked as recently used. A backing file that is
    /// missing or has the wrong size is dropped and reported as a miss.
    pub async fn get(&self, resource: &ResourceId, offset: u64, length: u64) -> Option<Bytes> {
        if length == 0 {
            return Some(Bytes::new());
        }

        let mut state = self.state.lock().await;
        let Some(segments) = state.index.coverage(resource, offset, length) else {
            state.counters.misses += 1;
            return None;
        };

        let mut parts = Vec::with_capacity(segments.len());
        for segment in &segments {
            match self.read_segment(resource, segment).await {
                Ok(part) => parts.push(part),
                Err(e) => {
                    warn!(
                        url = %redact_url(resource.as_str()),
                        offset = segment.entry_offset,
                        error = %e,
                        "Dropping unreadable cache entry"
                    );
                    state.index.remove(resource, segment.entry_offset);
                    state.counters.misses += 1;
                    self.occupied.store(state.index.occupied(), Ordering::Release);
                    drop(state);
                    self.discard(&self.entry_path(resource, segment.entry_offset))
                        .await;
                    return None;
                }
            }
        }

        let now = self.clock.unix_timestamp_millis();
        for segment in &segments {
            state.index.touch(resource, segment.entry_offset, now);
        }
        state.counters.hits += 1;
        drop(state);

        if parts.len() == 1 {
            return parts.pop();
        }
        let mut buf = BytesMut::with_capacity(length as usize);
        for part in parts {
            buf.extend_from_slice(&part);
        }
        Some(buf.freeze())
    }

    /// Coverage check that leaves recency untouched.
    pub async fn contains_range(&self, resource: &ResourceId, offset: u64, length: u64) -> bool {
        if length == 0 {
            return true;
        }
        self.state
            .lock()
            .await
            .index
            .coverage(resource, offset, length)
            .is_some()
    }

    /// Drop every entry and its file.
    ///
    /// The index is emptied and the generation bumped even if the storage
    /// engine fails to remove the files; that failure is returned.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> std::result::Result<(), CacheError> {
        let mut state = self.state.lock().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        let freed_bytes = state.index.clear();
        self.occupied.store(0, Ordering::Release);

        let removed = match self.fs.delete_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => {
                // A writer that raced the clear may have dropped a temp file in.
                debug!(error = %e, "Recursive delete failed, removing files one by one");
                self.sweep_files().await
            }
        };
        let recreated = self.fs.create_dir_all(&self.root).await;
        drop(state);

        info!(freed_bytes, "Cache cleared");
        self.emit(CacheEvent::Cleared { freed_bytes });

        removed?;
        recreated.map_err(CacheError::from)
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            capacity_bytes: self.config.capacity_bytes,
            occupied_bytes: state.index.occupied(),
            entry_count: state.index.len(),
            resource_count: state.index.resource_count(),
            hits: state.counters.hits,
            misses: state.counters.misses,
            evictions: state.counters.evictions,
            rejected_writes: state.counters.rejected_writes,
            generation: self.generation(),
        }
    }

    /// Current entries, least recently used first.
    pub async fn entries(&self) -> Vec<CacheEntry> {
        self.state.lock().await.index.entries()
    }

    /// Bytes on disk below the cache root.
    ///
    /// Exceeds [`occupied_bytes`](Self::occupied_bytes) when victim files
    /// could not be deleted; those are removed by the next clear or open.
    pub async fn disk_usage(&self) -> std::result::Result<u64, CacheError> {
        Ok(self.fs.directory_size(&self.root).await?)
    }

    async fn read_segment(
        &self,
        resource: &ResourceId,
        segment: &Segment,
    ) -> std::result::Result<Bytes, CacheError> {
        let data = self
            .fs
            .read_file(&self.entry_path(resource, segment.entry_offset))
            .await?;
        if data.len() as u64 != segment.entry_length {
            return Err(CacheError::Storage(format!(
                "expected {} bytes, found {}",
                segment.entry_length,
                data.len()
            )));
        }
        let start = segment.skip as usize;
        Ok(data.slice(start..start + segment.take as usize))
    }

    fn entry_path(&self, resource: &ResourceId, offset: u64) -> PathBuf {
        self.root
            .join(resource_dir_name(resource))
            .join(format!("{}.bin", offset))
    }

    /// Delete every file below the root, tolerating files that vanish
    /// concurrently. Directories are left in place.
    async fn sweep_files(&self) -> std::result::Result<(), CacheError> {
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let children = match self.fs.list_directory(&dir).await {
                Ok(children) => children,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            for child in children {
                let metadata = match self.fs.metadata(&child).await {
                    Ok(metadata) => metadata,
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => return Err(e.into()),
                };
                if metadata.is_directory {
                    pending.push(child);
                    continue;
                }
                match self.fs.delete_file(&child).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    async fn discard(&self, path: &Path) {
        if let Err(e) = self.fs.delete_file(path).await {
            if !e.is_not_found() {
                let path = path.to_string_lossy();
                warn!(file = strip_path(&path), error = %e, "Failed to remove cache file");
            }
        }
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Cache(event));
        }
    }
}

/// Hex SHA-256 of the resource id; keeps URLs out of file names.
pub(crate) fn resource_dir_name(resource: &ResourceId) -> String {
    hex::encode(Sha256::digest(resource.as_str().as_bytes()))
}

impl std::fmt::Debug for EvictingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvictingCache")
            .field("root", &self.root)
            .field("capacity_bytes", &self.config.capacity_bytes)
            .field("occupied_bytes", &self.occupied_bytes())
            .field("generation", &self.generation())
            .finish()
    }
}
