//! Tests for the range fetcher
//!
//! A scripted in-memory origin serves ranges in small chunks so that
//! cancellation and read timeouts hit mid-transfer.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{DynAsyncRead, HttpClient, HttpRequest, StreamingResponse};
use bridge_traits::testing::{InMemoryFileSystem, InMemoryHttpClient, ManualClock, RangeBehavior};
use bridge_traits::BridgeError;
use bytes::Bytes;
use core_async::sync::CancellationToken;
use core_playback::cache::{CacheConfig, EvictingCache};
use core_playback::{FetchConfig, FetchError, RangeFetcher, ResourceId};
use mockall::mock;
use std::sync::Arc;
use std::time::Duration;

const URL: &str = "https://cdn.example/video.mp4";

fn payload(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>())
}

async fn setup(
    http: Arc<dyn HttpClient>,
    capacity: u64,
    config: FetchConfig,
) -> (RangeFetcher, Arc<EvictingCache>) {
    let cache = Arc::new(
        EvictingCache::open(
            CacheConfig::new(capacity),
            Arc::new(InMemoryFileSystem::new()),
            Arc::new(ManualClock::new(0)),
        )
        .await
        .unwrap(),
    );
    (RangeFetcher::new(http, cache.clone(), config), cache)
}

fn fast_timeouts() -> FetchConfig {
    FetchConfig {
        connect_timeout: Duration::from_millis(200),
        read_timeout: Duration::from_millis(100),
    }
}

#[tokio::test]
async fn test_fetch_stores_requested_range() {
    let http = InMemoryHttpClient::new().with_chunk_size(100);
    http.insert(URL, payload(5_000));
    let (fetcher, cache) = setup(Arc::new(http.clone()), 10_000, FetchConfig::default()).await;
    let resource = ResourceId::from(URL);

    let written = fetcher
        .fetch(&resource, 1_000, 1_024, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(written, 1_024);
    assert_eq!(
        cache.get(&resource, 1_000, 1_024).await.unwrap(),
        payload(5_000).slice(1_000..2_024)
    );
    let request = &http.requests()[0];
    assert_eq!(request.headers.get("Range").unwrap(), "bytes=1000-2023");
}

#[tokio::test]
async fn test_fetch_skips_network_when_cached() {
    let http = InMemoryHttpClient::new();
    http.insert(URL, payload(2_000));
    let (fetcher, _) = setup(Arc::new(http.clone()), 10_000, FetchConfig::default()).await;
    let resource = ResourceId::from(URL);
    let cancel = CancellationToken::new();

    assert_eq!(fetcher.fetch(&resource, 0, 1_000, &cancel).await.unwrap(), 1_000);
    assert_eq!(fetcher.fetch(&resource, 0, 1_000, &cancel).await.unwrap(), 0);
    assert_eq!(http.request_count(URL), 1);
}

#[tokio::test]
async fn test_short_resource_stores_what_exists() {
    let http = InMemoryHttpClient::new();
    http.insert(URL, payload(300));
    let (fetcher, cache) = setup(Arc::new(http), 10_000, FetchConfig::default()).await;
    let resource = ResourceId::from(URL);

    let written = fetcher
        .fetch(&resource, 0, 1_024, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(written, 300);
    assert_eq!(cache.occupied_bytes(), 300);
    assert!(cache.get(&resource, 0, 300).await.is_some());
}

#[tokio::test]
async fn test_full_body_accepted_at_offset_zero() {
    let http = InMemoryHttpClient::new();
    http.insert(URL, payload(4_000));
    http.set_behavior(URL, RangeBehavior::Ignore);
    let (fetcher, cache) = setup(Arc::new(http), 10_000, FetchConfig::default()).await;
    let resource = ResourceId::from(URL);

    let written = fetcher
        .fetch(&resource, 0, 1_000, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(written, 1_000);
    assert_eq!(cache.occupied_bytes(), 1_000);
}

#[tokio::test]
async fn test_ignored_range_past_zero_is_unsupported() {
    let http = InMemoryHttpClient::new();
    http.insert(URL, payload(4_000));
    http.set_behavior(URL, RangeBehavior::Ignore);
    let (fetcher, cache) = setup(Arc::new(http), 10_000, FetchConfig::default()).await;

    let err = fetcher
        .fetch(&ResourceId::from(URL), 500, 1_000, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::RangeUnsupported(_)));
    assert!(err.is_permanent());
    assert_eq!(cache.occupied_bytes(), 0);
}

#[tokio::test]
async fn test_range_not_satisfiable_is_unsupported() {
    let http = InMemoryHttpClient::new();
    http.insert(URL, payload(100));
    let (fetcher, _) = setup(Arc::new(http), 10_000, FetchConfig::default()).await;

    let err = fetcher
        .fetch(&ResourceId::from(URL), 500, 100, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::RangeUnsupported(_)));
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let http = InMemoryHttpClient::new();
    http.insert(URL, payload(100));
    http.set_behavior(URL, RangeBehavior::Status(503));
    let (fetcher, _) = setup(Arc::new(http), 10_000, FetchConfig::default()).await;

    let err = fetcher
        .fetch(&ResourceId::from(URL), 0, 100, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Network(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_connection_failure_is_network_error() {
    let http = InMemoryHttpClient::new();
    http.insert(URL, payload(100));
    http.set_behavior(URL, RangeBehavior::ConnectionRefused);
    let (fetcher, _) = setup(Arc::new(http), 10_000, FetchConfig::default()).await;

    let err = fetcher
        .fetch(&ResourceId::from(URL), 0, 100, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Network(_)));
}

#[tokio::test]
async fn test_stalled_body_times_out() {
    let http = InMemoryHttpClient::new().with_chunk_size(64);
    http.insert(URL, payload(4_096));
    http.stall_after(URL, 512);
    let (fetcher, cache) = setup(Arc::new(http), 10_000, fast_timeouts()).await;
    let resource = ResourceId::from(URL);

    let err = fetcher
        .fetch(&resource, 0, 4_096, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Network(_)));
    assert!(cache.get(&resource, 0, 512).await.is_none());
    assert_eq!(cache.occupied_bytes(), 0);
}

#[tokio::test]
async fn test_cancel_mid_transfer_leaves_no_entry() {
    let http = InMemoryHttpClient::new().with_chunk_size(64);
    http.insert(URL, payload(4_096));
    http.stall_after(URL, 1_024);
    let (fetcher, cache) = setup(
        Arc::new(http),
        10_000,
        FetchConfig {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
        },
    )
    .await;
    let fetcher = Arc::new(fetcher);
    let resource = ResourceId::from(URL);
    let cancel = CancellationToken::new();

    let task = {
        let fetcher = fetcher.clone();
        let resource = resource.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { fetcher.fetch(&resource, 0, 4_096, &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let err = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("cancellation is observed promptly")
        .unwrap()
        .unwrap_err();

    assert_eq!(err, FetchError::Cancelled);
    assert!(cache.get(&resource, 0, 4_096).await.is_none());
    assert!(cache.get(&resource, 0, 1_024).await.is_none());
    assert_eq!(cache.occupied_bytes(), 0);
}

#[tokio::test]
async fn test_pre_cancelled_token_skips_request() {
    let http = InMemoryHttpClient::new();
    http.insert(URL, payload(100));
    let (fetcher, _) = setup(Arc::new(http.clone()), 10_000, FetchConfig::default()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = fetcher
        .fetch(&ResourceId::from(URL), 0, 100, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Cancelled);
    assert_eq!(http.request_count(URL), 0);
}

#[tokio::test]
async fn test_range_larger_than_cache_is_capacity_error() {
    let http = InMemoryHttpClient::new();
    http.insert(URL, payload(2_000));
    let (fetcher, cache) = setup(Arc::new(http), 1_000, FetchConfig::default()).await;

    let err = fetcher
        .fetch(&ResourceId::from(URL), 0, 1_500, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Cache(_)));
    assert!(!err.is_transient());
    assert_eq!(cache.occupied_bytes(), 0);
}

#[tokio::test]
async fn test_read_full_and_slice() {
    let http = InMemoryHttpClient::new().with_chunk_size(100);
    http.insert(URL, payload(3_000));
    http.set_behavior(URL, RangeBehavior::Ignore);
    let (fetcher, cache) = setup(Arc::new(http), 10_000, FetchConfig::default()).await;

    let data = fetcher
        .read_full_and_slice(&ResourceId::from(URL), 1_234, 500, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(data, payload(3_000).slice(1_234..1_734));
    assert_eq!(cache.occupied_bytes(), 0);
}

mock! {
    Origin {}

    #[async_trait]
    impl HttpClient for Origin {
        async fn execute_streaming(&self, request: HttpRequest) -> BridgeResult<StreamingResponse>;
        async fn download_stream(&self, url: String) -> BridgeResult<Box<DynAsyncRead>>;
        async fn is_connected(&self) -> bool;
    }
}

fn mocked_response(status: u16, content_range: &str, body: &'static [u8]) -> StreamingResponse {
    let mut headers = std::collections::HashMap::new();
    headers.insert("content-range".to_string(), content_range.to_string());
    StreamingResponse {
        status,
        headers,
        content_length: Some(body.len() as u64),
        body: Box::new(body),
    }
}

#[tokio::test]
async fn test_mismatched_content_range_is_unsupported() {
    let mut origin = MockOrigin::new();
    origin
        .expect_execute_streaming()
        .times(1)
        .returning(|_| Ok(mocked_response(206, "bytes 0-9/100", b"0123456789")));
    let (fetcher, cache) = setup(Arc::new(origin), 1_000, FetchConfig::default()).await;

    let err = fetcher
        .fetch(&ResourceId::from(URL), 50, 10, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_permanent());
    assert_eq!(cache.occupied_bytes(), 0);
}

#[tokio::test]
async fn test_bridge_timeout_maps_to_network() {
    let mut origin = MockOrigin::new();
    origin
        .expect_execute_streaming()
        .withf(|request| request.timeout == Some(Duration::from_secs(3)))
        .returning(|_| Err(BridgeError::Timeout("headers".to_string())));
    let (fetcher, _) = setup(
        Arc::new(origin),
        1_000,
        FetchConfig {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(3),
        },
    )
    .await;

    let err = fetcher
        .fetch(&ResourceId::from(URL), 0, 10, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Network(_)));
}

#[tokio::test]
async fn test_mocked_partial_content_is_stored() {
    let mut origin = MockOrigin::new();
    origin
        .expect_execute_streaming()
        .returning(|_| Ok(mocked_response(206, "bytes 10-19/100", b"abcdefghij")));
    let (fetcher, cache) = setup(Arc::new(origin), 1_000, FetchConfig::default()).await;
    let resource = ResourceId::from(URL);

    let written = fetcher
        .fetch(&resource, 10, 10, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(written, 10);
    assert_eq!(
        cache.get(&resource, 10, 10).await.unwrap(),
        Bytes::from_static(b"abcdefghij")
    );
}
