//! Tests for the evicting cache
//!
//! These tests drive the cache through its public API over the in-memory
//! filesystem and a manual clock, so eviction order is deterministic.

use bridge_traits::testing::{InMemoryFileSystem, ManualClock};
use bytes::Bytes;
use core_playback::cache::{CacheConfig, EvictingCache};
use core_playback::{CacheError, ResourceId};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use std::sync::Arc;

struct Harness {
    cache: EvictingCache,
    fs: Arc<InMemoryFileSystem>,
    clock: Arc<ManualClock>,
}

async fn harness(capacity: u64) -> Harness {
    let fs = Arc::new(InMemoryFileSystem::new());
    let clock = Arc::new(ManualClock::new(1_000));
    let cache = EvictingCache::open(CacheConfig::new(capacity), fs.clone(), clock.clone())
        .await
        .unwrap();
    Harness { cache, fs, clock }
}

fn bytes(fill: u8, len: usize) -> Bytes {
    Bytes::from(vec![fill; len])
}

#[tokio::test]
async fn test_second_write_evicts_first_when_full() {
    let h = harness(10).await;
    let a = ResourceId::from("A");
    let b = ResourceId::from("B");

    h.cache.put(&a, 0, bytes(1, 6)).await.unwrap();
    h.clock.advance_millis(1);
    h.cache.put(&b, 0, bytes(2, 6)).await.unwrap();

    assert_eq!(h.cache.occupied_bytes(), 6);
    assert!(h.cache.get(&a, 0, 6).await.is_none());
    assert_eq!(h.cache.get(&b, 0, 6).await.unwrap(), bytes(2, 6));
    assert_eq!(h.fs.file_count(), 1);
}

#[tokio::test]
async fn test_least_recently_used_is_evicted() {
    let h = harness(10).await;
    let a = ResourceId::from("A");
    let b = ResourceId::from("B");
    let c = ResourceId::from("C");

    h.cache.put(&a, 0, bytes(1, 4)).await.unwrap();
    h.clock.advance_millis(10);
    h.cache.put(&b, 0, bytes(2, 4)).await.unwrap();
    h.clock.advance_millis(10);
    h.cache.put(&c, 0, bytes(3, 4)).await.unwrap();

    assert!(!h.cache.contains_range(&a, 0, 4).await);
    assert!(h.cache.contains_range(&b, 0, 4).await);
    assert!(h.cache.contains_range(&c, 0, 4).await);
    assert_eq!(h.cache.stats().await.evictions, 1);
}

#[tokio::test]
async fn test_read_refreshes_recency() {
    let h = harness(10).await;
    let a = ResourceId::from("A");
    let b = ResourceId::from("B");
    let c = ResourceId::from("C");

    h.cache.put(&a, 0, bytes(1, 4)).await.unwrap();
    h.clock.advance_millis(10);
    h.cache.put(&b, 0, bytes(2, 4)).await.unwrap();
    h.clock.advance_millis(10);
    assert!(h.cache.get(&a, 0, 4).await.is_some());
    h.clock.advance_millis(10);
    h.cache.put(&c, 0, bytes(3, 4)).await.unwrap();

    assert!(h.cache.contains_range(&a, 0, 4).await);
    assert!(!h.cache.contains_range(&b, 0, 4).await);
}

#[tokio::test]
async fn test_contains_range_does_not_touch() {
    let h = harness(10).await;
    let a = ResourceId::from("A");
    let b = ResourceId::from("B");
    let c = ResourceId::from("C");

    h.cache.put(&a, 0, bytes(1, 4)).await.unwrap();
    h.clock.advance_millis(10);
    h.cache.put(&b, 0, bytes(2, 4)).await.unwrap();
    h.clock.advance_millis(10);
    assert!(h.cache.contains_range(&a, 0, 4).await);
    h.cache.put(&c, 0, bytes(3, 4)).await.unwrap();

    assert!(!h.cache.contains_range(&a, 0, 4).await);
}

#[tokio::test]
async fn test_equal_timestamps_evict_smaller_resource_first() {
    let h = harness(8).await;
    let b = ResourceId::from("https://cdn.example/b");
    let a = ResourceId::from("https://cdn.example/a");
    let c = ResourceId::from("https://cdn.example/c");

    h.cache.put(&b, 0, bytes(2, 4)).await.unwrap();
    h.cache.put(&a, 0, bytes(1, 4)).await.unwrap();
    h.cache.put(&c, 0, bytes(3, 4)).await.unwrap();

    let survivors: Vec<_> = h
        .cache
        .entries()
        .await
        .into_iter()
        .map(|e| e.resource_id)
        .collect();
    assert!(!survivors.contains(&a));
    assert!(survivors.contains(&b));
    assert!(survivors.contains(&c));
}

#[tokio::test]
async fn test_oversized_write_leaves_cache_unchanged() {
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let h = harness(10).await;
    let cache = h.cache.with_event_bus(bus.clone());
    let a = ResourceId::from("A");
    let big = ResourceId::from("BIG");

    cache.put(&a, 0, bytes(1, 4)).await.unwrap();
    let err = cache.put(&big, 0, bytes(9, 11)).await.unwrap_err();

    assert_eq!(
        err,
        CacheError::CapacityUnavailable {
            requested: 11,
            capacity: 10
        }
    );
    assert_eq!(cache.occupied_bytes(), 4);
    assert!(cache.contains_range(&a, 0, 4).await);
    assert_eq!(h.fs.file_count(), 1);

    let stats = cache.stats().await;
    assert_eq!(stats.rejected_writes, 1);
    assert_eq!(stats.entry_count, 1);

    match events.recv().await.unwrap() {
        CoreEvent::Cache(CacheEvent::WriteRejected { requested, .. }) => assert_eq!(requested, 11),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_occupied_never_exceeds_capacity() {
    let h = harness(100).await;
    for i in 0..50u64 {
        let resource = ResourceId::from(format!("https://cdn.example/{}", i % 7));
        let len = 5 + (i * 13 % 40) as usize;
        h.clock.advance_millis(1);
        h.cache.put(&resource, (i % 3) * 100, bytes(i as u8, len)).await.unwrap();
        assert!(h.cache.occupied_bytes() <= 100);
        assert_eq!(h.cache.occupied_bytes(), h.fs.stored_bytes());
    }
}

#[tokio::test]
async fn test_get_stitches_adjacent_ranges() {
    let h = harness(100).await;
    let a = ResourceId::from("A");

    h.cache.put(&a, 0, Bytes::from_static(b"hello ")).await.unwrap();
    h.cache.put(&a, 6, Bytes::from_static(b"world")).await.unwrap();

    assert_eq!(h.cache.get(&a, 0, 11).await.unwrap(), Bytes::from_static(b"hello world"));
    assert_eq!(h.cache.get(&a, 4, 4).await.unwrap(), Bytes::from_static(b"o wo"));
    assert!(h.cache.get(&a, 8, 10).await.is_none());

    let stats = h.cache.stats().await;
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.resource_count, 1);
}

#[tokio::test]
async fn test_rewriting_same_offset_replaces_entry() {
    let h = harness(10).await;
    let a = ResourceId::from("A");

    h.cache.put(&a, 0, bytes(1, 8)).await.unwrap();
    h.cache.put(&a, 0, bytes(2, 3)).await.unwrap();

    assert_eq!(h.cache.occupied_bytes(), 3);
    assert_eq!(h.cache.get(&a, 0, 3).await.unwrap(), bytes(2, 3));
    assert_eq!(h.fs.file_count(), 1);
}

#[tokio::test]
async fn test_clear_all_is_a_barrier() {
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let h = harness(100).await;
    let cache = h.cache.with_event_bus(bus.clone());
    let a = ResourceId::from("A");

    cache.put(&a, 0, bytes(1, 10)).await.unwrap();
    let before = cache.generation();

    cache.clear_all().await.unwrap();
    assert_eq!(cache.occupied_bytes(), 0);
    assert!(cache.get(&a, 0, 10).await.is_none());
    assert_eq!(h.fs.file_count(), 0);
    assert_eq!(cache.generation(), before + 1);

    let err = cache
        .put_in_generation(&a, 0, bytes(1, 10), before)
        .await
        .unwrap_err();
    assert_eq!(err, CacheError::Invalidated);
    assert_eq!(cache.occupied_bytes(), 0);
    assert_eq!(h.fs.file_count(), 0);

    cache.put(&a, 0, bytes(2, 10)).await.unwrap();
    assert_eq!(cache.occupied_bytes(), 10);

    match events.recv().await.unwrap() {
        CoreEvent::Cache(CacheEvent::Cleared { freed_bytes }) => assert_eq!(freed_bytes, 10),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_clear_all_surfaces_storage_failure() {
    let h = harness(100).await;
    let a = ResourceId::from("A");
    h.cache.put(&a, 0, bytes(1, 10)).await.unwrap();

    h.fs.fail_deletes(true);
    let err = h.cache.clear_all().await.unwrap_err();

    assert!(matches!(err, CacheError::Storage(_)));
    assert_eq!(h.cache.occupied_bytes(), 0);
    assert!(h.cache.get(&a, 0, 10).await.is_none());
}

#[tokio::test]
async fn test_clear_all_removes_files_when_directory_delete_fails() {
    let h = harness(100).await;
    let a = ResourceId::from("A");
    let b = ResourceId::from("B");
    h.cache.put(&a, 0, bytes(1, 10)).await.unwrap();
    h.cache.put(&b, 40, bytes(2, 10)).await.unwrap();

    h.fs.fail_dir_deletes(true);
    h.cache.clear_all().await.unwrap();

    assert_eq!(h.fs.file_count(), 0);
    assert_eq!(h.cache.occupied_bytes(), 0);

    h.cache.put(&a, 0, bytes(3, 10)).await.unwrap();
    assert_eq!(h.cache.get(&a, 0, 10).await.unwrap(), bytes(3, 10));
}

#[tokio::test]
async fn test_range_past_addressable_end_is_rejected() {
    let h = harness(100).await;
    let a = ResourceId::from("A");

    let err = h.cache.put(&a, u64::MAX - 1, bytes(1, 5)).await.unwrap_err();

    assert_eq!(
        err,
        CacheError::RangeOverflow {
            offset: u64::MAX - 1,
            length: 5
        }
    );
    assert_eq!(h.cache.occupied_bytes(), 0);
    assert_eq!(h.fs.file_count(), 0);
    assert!(h.cache.get(&a, u64::MAX - 1, 1).await.is_none());
}

#[tokio::test]
async fn test_range_ending_at_addressable_end() {
    let h = harness(100).await;
    let a = ResourceId::from("A");

    h.cache.put(&a, u64::MAX - 5, bytes(7, 5)).await.unwrap();

    assert_eq!(h.cache.get(&a, u64::MAX - 5, 5).await.unwrap(), bytes(7, 5));
    assert_eq!(h.cache.get(&a, u64::MAX - 2, 2).await.unwrap(), bytes(7, 2));
    assert!(h.cache.get(&a, u64::MAX - 2, 5).await.is_none());
}

#[tokio::test]
async fn test_eviction_events() {
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let h = harness(10).await;
    let cache = h.cache.with_event_bus(bus.clone());
    let a = ResourceId::from("A");
    let b = ResourceId::from("B");

    cache.put(&a, 0, bytes(1, 6)).await.unwrap();
    h.clock.advance_millis(1);
    cache.put(&b, 0, bytes(2, 6)).await.unwrap();

    match events.recv().await.unwrap() {
        CoreEvent::Cache(CacheEvent::Evicted {
            resource_id,
            offset,
            length,
        }) => {
            assert_eq!(resource_id, "A");
            assert_eq!(offset, 0);
            assert_eq!(length, 6);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_puts_respect_capacity() {
    let h = harness(64).await;
    let cache = Arc::new(h.cache);

    let mut handles = Vec::new();
    for i in 0..16u8 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            let resource = ResourceId::from(format!("https://cdn.example/{}", i));
            cache.put(&resource, 0, bytes(i, 16)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(cache.occupied_bytes(), 64);
    assert_eq!(cache.stats().await.entry_count, 4);
    assert_eq!(h.fs.stored_bytes(), 64);
}
