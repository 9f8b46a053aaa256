//! Cache configuration

use serde::{Deserialize, Serialize};

/// Subdirectory of the host cache directory holding range files.
pub const DEFAULT_RANGES_DIRECTORY: &str = "ranges";

/// Configuration for the evicting cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum bytes held across all entries
    pub capacity_bytes: u64,

    /// Directory below the cache root owned by this cache; wiped on open
    pub ranges_directory: String,
}

impl CacheConfig {
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            capacity_bytes,
            ranges_directory: DEFAULT_RANGES_DIRECTORY.to_string(),
        }
    }

    pub fn with_ranges_directory(mut self, name: impl Into<String>) -> Self {
        self.ranges_directory = name.into();
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity_bytes == 0 {
            return Err("Cache capacity must be greater than 0".to_string());
        }

        if self.ranges_directory.is_empty()
            || self.ranges_directory.contains(['/', '\\'])
            || matches!(self.ranges_directory.as_str(), "." | "..")
        {
            return Err(format!(
                "Invalid ranges directory name: {:?}",
                self.ranges_directory
            ));
        }

        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(core_runtime::config::DEFAULT_CACHE_CAPACITY_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.capacity_bytes, 200 * 1024 * 1024);
        assert_eq!(config.ranges_directory, "ranges");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(CacheConfig::new(0).validate().is_err());
        assert!(CacheConfig::new(10).with_ranges_directory("").validate().is_err());
        assert!(CacheConfig::new(10).with_ranges_directory("a/b").validate().is_err());
        assert!(CacheConfig::new(10).with_ranges_directory("..").validate().is_err());
        assert!(CacheConfig::new(10).validate().is_ok());
    }
}
