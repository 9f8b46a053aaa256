//! # Core Configuration Module
//!
//! Builder-based configuration for the feed prefetch core.
//!
//! ## Overview
//!
//! [`CoreConfig`] holds the tunables (cache capacity, prefetch radius and
//! budget, network timeouts) together with the host bridges the core needs.
//! Validation is fail-fast: `build()` refuses inconsistent values and names
//! the missing capability when a bridge was not injected.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - range requests against the media origin
//! - `FileSystemAccess` - storage for cached ranges
//!
//! When the `desktop-shims` feature is enabled, `ReqwestHttpClient` and
//! `TokioFileSystem` are injected automatically if not provided.
//!
//! ## Defaults
//!
//! | Setting | Default |
//! |---------|---------|
//! | `cache_capacity_bytes` | 200 MiB |
//! | `prefetch_radius` | 3 |
//! | `prefetch_budget_bytes` | 1 MiB |
//! | `connect_timeout` / `read_timeout` | 10 s |
//! | `max_concurrent_prefetches` | 6 |
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .cache_dir("/tmp/MediaCache")
//!     .cache_capacity_bytes(64 * 1024 * 1024)
//!     .prefetch_radius(2)
//!     .build()?;
//! ```
//!
//! Without `desktop-shims`, bridges must be supplied:
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .http_client(Arc::new(MyHttpClient))
//!     .file_system(Arc::new(MyFileSystem))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, FileSystemAccess, HttpClient, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const MIB: u64 = 1024 * 1024;
pub const DEFAULT_CACHE_CAPACITY_BYTES: u64 = 200 * MIB;
pub const DEFAULT_PREFETCH_RADIUS: usize = 3;
pub const DEFAULT_PREFETCH_BUDGET_BYTES: u64 = MIB;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_CONCURRENT_PREFETCHES: usize = 6;
pub const DEFAULT_USER_AGENT: &str = concat!("feed-prefetch/", env!("CARGO_PKG_VERSION"));

/// Upper bound for the radius; beyond this a cursor move would fan out into
/// thousands of requests.
pub const MAX_PREFETCH_RADIUS: usize = 64;

/// Core configuration for the feed prefetch core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Root for cached ranges. `None` uses the file system bridge's cache
    /// directory.
    pub cache_dir: Option<PathBuf>,

    /// Upper bound on the total bytes kept on disk
    pub cache_capacity_bytes: u64,

    /// Neighbours prefetched on each side of the cursor
    pub prefetch_radius: usize,

    /// Bytes prefetched from the start of each neighbour
    pub prefetch_budget_bytes: u64,

    /// Prefetch transfers allowed in flight at once
    pub max_concurrent_prefetches: usize,

    /// Bound on connection setup plus response headers
    pub connect_timeout: Duration,

    /// Bound on each individual body read
    pub read_timeout: Duration,

    /// User agent for the desktop HTTP client
    pub user_agent: String,

    /// Store ranges fetched on a playback cache miss
    pub cache_on_demand: bool,

    pub http_client: Arc<dyn HttpClient>,

    pub file_system: Arc<dyn FileSystemAccess>,

    /// Time source for cache recency
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("cache_dir", &self.cache_dir)
            .field("cache_capacity_bytes", &self.cache_capacity_bytes)
            .field("prefetch_radius", &self.prefetch_radius)
            .field("prefetch_budget_bytes", &self.prefetch_budget_bytes)
            .field("max_concurrent_prefetches", &self.max_concurrent_prefetches)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("user_agent", &self.user_agent)
            .field("cache_on_demand", &self.cache_on_demand)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the tunables.
    ///
    /// This checks:
    /// - capacity and budget are non-zero and the budget fits in the cache
    /// - the radius is at most 64
    /// - at least one prefetch may run
    /// - both timeouts are non-zero
    pub fn validate(&self) -> Result<()> {
        if let Some(dir) = &self.cache_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::Config("Cache directory cannot be empty".to_string()));
            }
        }

        if self.cache_capacity_bytes == 0 {
            return Err(Error::Config(
                "Cache capacity must be greater than 0 bytes".to_string(),
            ));
        }

        if self.prefetch_budget_bytes == 0 {
            return Err(Error::Config(
                "Prefetch budget must be greater than 0 bytes".to_string(),
            ));
        }

        if self.prefetch_budget_bytes > self.cache_capacity_bytes {
            return Err(Error::Config(format!(
                "Prefetch budget ({} bytes) exceeds cache capacity ({} bytes); \
                 every prefetch would be rejected",
                self.prefetch_budget_bytes, self.cache_capacity_bytes
            )));
        }

        if self.prefetch_radius > MAX_PREFETCH_RADIUS {
            return Err(Error::Config(format!(
                "Prefetch radius {} exceeds maximum of {}",
                self.prefetch_radius, MAX_PREFETCH_RADIUS
            )));
        }

        if self.max_concurrent_prefetches == 0 {
            return Err(Error::Config(
                "max_concurrent_prefetches must be at least 1".to_string(),
            ));
        }

        if self.connect_timeout.is_zero() || self.read_timeout.is_zero() {
            return Err(Error::Config(
                "Connect and read timeouts must be non-zero".to_string(),
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(Error::Config("User agent cannot be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "An HttpClient implementation is required for range requests. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Mobile: inject the platform HTTP stack."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn file_system_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "A FileSystemAccess implementation is required for the media cache. \
                 Desktop: enable the 'desktop-shims' feature to use TokioFileSystem. \
                 Mobile: inject sandboxed app storage."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(
    connect_timeout: Duration,
    user_agent: &str,
) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::{HttpClientOptions, ReqwestHttpClient};

    let client = ReqwestHttpClient::new(HttpClientOptions {
        connect_timeout,
        user_agent: user_agent.to_string(),
        ..Default::default()
    })
    .map_err(|e| Error::Internal(format!("Failed to initialize default HttpClient: {}", e)))?;

    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(
    _connect_timeout: Duration,
    _user_agent: &str,
) -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system(cache_dir: Option<&PathBuf>) -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    let fs = match cache_dir {
        Some(dir) => TokioFileSystem::with_cache_directory(dir.clone()),
        None => TokioFileSystem::new(),
    };
    Ok(Arc::new(fs))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system(_cache_dir: Option<&PathBuf>) -> Result<Arc<dyn FileSystemAccess>> {
    Err(file_system_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    cache_dir: Option<PathBuf>,
    cache_capacity_bytes: Option<u64>,
    prefetch_radius: Option<usize>,
    prefetch_budget_bytes: Option<u64>,
    max_concurrent_prefetches: Option<usize>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    user_agent: Option<String>,
    cache_on_demand: Option<bool>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    pub fn cache_capacity_bytes(mut self, bytes: u64) -> Self {
        self.cache_capacity_bytes = Some(bytes);
        self
    }

    /// Convenience for `cache_capacity_bytes(mb * 1 MiB)`.
    pub fn cache_capacity_mb(self, mb: u64) -> Self {
        self.cache_capacity_bytes(mb.saturating_mul(MIB))
    }

    pub fn prefetch_radius(mut self, radius: usize) -> Self {
        self.prefetch_radius = Some(radius);
        self
    }

    pub fn prefetch_budget_bytes(mut self, bytes: u64) -> Self {
        self.prefetch_budget_bytes = Some(bytes);
        self
    }

    pub fn max_concurrent_prefetches(mut self, limit: usize) -> Self {
        self.max_concurrent_prefetches = Some(limit);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn cache_on_demand(mut self, enabled: bool) -> Self {
        self.cache_on_demand = Some(enabled);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for out-of-range tunables
    /// - [`Error::CapabilityMissing`] when a bridge is absent and no desktop
    ///   default is compiled in
    pub fn build(self) -> Result<CoreConfig> {
        let connect_timeout = self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(connect_timeout, &user_agent)?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system(self.cache_dir.as_ref())?,
        };

        let config = CoreConfig {
            cache_dir: self.cache_dir,
            cache_capacity_bytes: self
                .cache_capacity_bytes
                .unwrap_or(DEFAULT_CACHE_CAPACITY_BYTES),
            prefetch_radius: self.prefetch_radius.unwrap_or(DEFAULT_PREFETCH_RADIUS),
            prefetch_budget_bytes: self
                .prefetch_budget_bytes
                .unwrap_or(DEFAULT_PREFETCH_BUDGET_BYTES),
            max_concurrent_prefetches: self
                .max_concurrent_prefetches
                .unwrap_or(DEFAULT_MAX_CONCURRENT_PREFETCHES),
            connect_timeout,
            read_timeout: self.read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT),
            user_agent,
            cache_on_demand: self.cache_on_demand.unwrap_or(true),
            http_client,
            file_system,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::testing::{InMemoryFileSystem, InMemoryHttpClient};

    fn builder_with_bridges() -> CoreConfigBuilder {
        CoreConfig::builder()
            .http_client(Arc::new(InMemoryHttpClient::new()))
            .file_system(Arc::new(InMemoryFileSystem::new()))
    }

    #[test]
    fn test_defaults() {
        let config = builder_with_bridges().build().unwrap();

        assert_eq!(config.cache_capacity_bytes, 200 * 1024 * 1024);
        assert_eq!(config.prefetch_radius, 3);
        assert_eq!(config.prefetch_budget_bytes, 1024 * 1024);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.max_concurrent_prefetches, 6);
        assert!(config.cache_on_demand);
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = builder_with_bridges()
            .cache_dir("/tmp/feed-cache")
            .cache_capacity_mb(50)
            .prefetch_radius(1)
            .prefetch_budget_bytes(512 * 1024)
            .max_concurrent_prefetches(2)
            .read_timeout(Duration::from_secs(3))
            .cache_on_demand(false)
            .build()
            .unwrap();

        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/feed-cache")));
        assert_eq!(config.cache_capacity_bytes, 50 * MIB);
        assert_eq!(config.prefetch_radius, 1);
        assert_eq!(config.max_concurrent_prefetches, 2);
        assert_eq!(config.read_timeout, Duration::from_secs(3));
        assert!(!config.cache_on_demand);
    }

    #[test]
    fn test_zero_radius_is_allowed() {
        let config = builder_with_bridges().prefetch_radius(0).build().unwrap();
        assert_eq!(config.prefetch_radius, 0);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = builder_with_bridges()
            .cache_capacity_bytes(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("capacity")));
    }

    #[test]
    fn test_rejects_budget_larger_than_capacity() {
        let err = builder_with_bridges()
            .cache_capacity_bytes(10)
            .prefetch_budget_bytes(11)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("exceeds cache capacity")));
    }

    #[test]
    fn test_rejects_zero_concurrency_and_timeouts() {
        assert!(builder_with_bridges()
            .max_concurrent_prefetches(0)
            .build()
            .is_err());
        assert!(builder_with_bridges()
            .read_timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(builder_with_bridges()
            .prefetch_radius(MAX_PREFETCH_RADIUS + 1)
            .build()
            .is_err());
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = builder_with_bridges().build().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("cache_capacity_bytes"));
        assert!(debug.contains("HttpClient { ... }"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_bridges_fail_fast() {
        let err = CoreConfig::builder().build().unwrap_err();
        assert!(matches!(err, Error::CapabilityMissing { capability, .. } if capability == "HttpClient"));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_desktop_defaults_are_injected() {
        let config = CoreConfig::builder()
            .cache_dir(std::env::temp_dir().join("feed-prefetch-config-test"))
            .build()
            .unwrap();
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }
}
