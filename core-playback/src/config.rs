//! # Playback Configuration
//!
//! Tuning knobs for the cache, the range fetcher and the prefetch scheduler,
//! plus splitters that hand each component only the part it needs.

use crate::cache::CacheConfig;
use crate::fetcher::FetchConfig;
use crate::scheduler::PrefetchConfig;
use core_runtime::config::{
    CoreConfig, DEFAULT_CACHE_CAPACITY_BYTES, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_MAX_CONCURRENT_PREFETCHES, DEFAULT_PREFETCH_BUDGET_BYTES, DEFAULT_PREFETCH_RADIUS,
    DEFAULT_READ_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Playback layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Upper bound on bytes held by the disk cache.
    ///
    /// Default: 200 MiB.
    #[serde(default = "default_cache_capacity_bytes")]
    pub cache_capacity_bytes: u64,

    /// Number of neighbours warmed on each side of the cursor.
    ///
    /// Default: 3.
    #[serde(default = "default_prefetch_radius")]
    pub prefetch_radius: usize,

    /// Bytes fetched from the start of each neighbour.
    ///
    /// Default: 1 MiB.
    #[serde(default = "default_prefetch_budget_bytes")]
    pub prefetch_budget_bytes: u64,

    /// Prefetch transfers allowed to run at once.
    ///
    /// Default: 6.
    #[serde(default = "default_max_concurrent_prefetches")]
    pub max_concurrent_prefetches: usize,

    /// Maximum duration to wait for response headers.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Maximum duration a single body read may block.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout: Duration,

    /// Store bytes fetched directly for playback in the cache.
    ///
    /// Default: true.
    #[serde(default = "default_cache_on_demand")]
    pub cache_on_demand: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            cache_capacity_bytes: default_cache_capacity_bytes(),
            prefetch_radius: default_prefetch_radius(),
            prefetch_budget_bytes: default_prefetch_budget_bytes(),
            max_concurrent_prefetches: default_max_concurrent_prefetches(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            cache_on_demand: default_cache_on_demand(),
        }
    }
}

impl PlaybackConfig {
    /// Take the playback-relevant fields of a validated [`CoreConfig`].
    pub fn from_core_config(config: &CoreConfig) -> Self {
        Self {
            cache_capacity_bytes: config.cache_capacity_bytes,
            prefetch_radius: config.prefetch_radius,
            prefetch_budget_bytes: config.prefetch_budget_bytes,
            max_concurrent_prefetches: config.max_concurrent_prefetches,
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            cache_on_demand: config.cache_on_demand,
        }
    }

    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity_bytes = bytes;
        self
    }

    pub fn with_prefetch_radius(mut self, radius: usize) -> Self {
        self.prefetch_radius = radius;
        self
    }

    pub fn with_prefetch_budget(mut self, bytes: u64) -> Self {
        self.prefetch_budget_bytes = bytes;
        self
    }

    pub fn with_max_concurrent_prefetches(mut self, limit: usize) -> Self {
        self.max_concurrent_prefetches = limit;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn with_cache_on_demand(mut self, enabled: bool) -> Self {
        self.cache_on_demand = enabled;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.cache_config().validate()?;
        self.prefetch_config().validate()?;
        self.fetch_config().validate()?;

        if self.prefetch_budget_bytes > self.cache_capacity_bytes {
            return Err(format!(
                "prefetch_budget_bytes ({}) must not exceed cache_capacity_bytes ({})",
                self.prefetch_budget_bytes, self.cache_capacity_bytes
            ));
        }

        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(self.cache_capacity_bytes)
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
        }
    }

    pub fn prefetch_config(&self) -> PrefetchConfig {
        PrefetchConfig {
            radius: self.prefetch_radius,
            budget_bytes: self.prefetch_budget_bytes,
            max_concurrent: self.max_concurrent_prefetches,
        }
    }
}

// Default value functions for serde

fn default_cache_capacity_bytes() -> u64 {
    DEFAULT_CACHE_CAPACITY_BYTES
}

fn default_prefetch_radius() -> usize {
    DEFAULT_PREFETCH_RADIUS
}

fn default_prefetch_budget_bytes() -> u64 {
    DEFAULT_PREFETCH_BUDGET_BYTES
}

fn default_max_concurrent_prefetches() -> usize {
    DEFAULT_MAX_CONCURRENT_PREFETCHES
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_read_timeout() -> Duration {
    DEFAULT_READ_TIMEOUT
}

fn default_cache_on_demand() -> bool {
    true
}
