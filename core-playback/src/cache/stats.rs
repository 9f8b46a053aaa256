//! Cache statistics and monitoring

use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Point-in-time view of the evicting cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Configured upper bound in bytes
    pub capacity_bytes: u64,

    /// Sum of all entry lengths
    pub occupied_bytes: u64,

    /// Number of stored ranges
    pub entry_count: usize,

    /// Number of distinct resources with at least one range
    pub resource_count: usize,

    /// `get` calls fully served from disk
    pub hits: u64,

    /// `get` calls that found no (or partial) coverage
    pub misses: u64,

    /// Entries removed to make room for writes
    pub evictions: u64,

    /// Writes refused because they exceeded capacity
    pub rejected_writes: u64,

    /// Number of `clear_all` calls so far
    pub generation: u64,
}

impl CacheStats {
    /// Occupancy as a percentage of capacity.
    pub fn usage_percentage(&self) -> f64 {
        if self.capacity_bytes == 0 {
            return 0.0;
        }

        (self.occupied_bytes as f64 / self.capacity_bytes as f64) * 100.0
    }

    /// Returns true if the cache is near capacity (>90%).
    pub fn is_near_capacity(&self) -> bool {
        self.usage_percentage() > 90.0
    }

    pub fn available_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.occupied_bytes)
    }

    /// Whole mebibytes occupied, rounded down, as shown in the cache label.
    pub fn occupied_megabytes(&self) -> u64 {
        self.occupied_bytes / MIB
    }

    /// Fraction of `get` calls served from cache, in percent.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }

        (self.hits as f64 / lookups as f64) * 100.0
    }
}
