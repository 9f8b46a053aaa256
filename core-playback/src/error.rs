//! # Playback Error Types
//!
//! Failure taxonomy for the cache, the range fetcher and the playback
//! boundary. Prefetch tasks absorb these into their task state; the
//! playback boundary and `clear_cache` surface them to callers.

use thiserror::Error;

/// Errors raised by the evicting cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A single range is larger than the whole cache.
    #[error("Range of {requested} bytes exceeds cache capacity of {capacity} bytes")]
    CapacityUnavailable { requested: u64, capacity: u64 },

    /// The storage engine failed to write, read or delete a backing file.
    #[error("Cache storage error: {0}")]
    Storage(String),

    /// `offset + length` does not fit in a `u64`.
    #[error("Range at offset {offset} with {length} bytes ends past the addressable limit")]
    RangeOverflow { offset: u64, length: u64 },

    /// The write started before a `clear_all` and was discarded.
    #[error("Cache was cleared while the write was in flight")]
    Invalidated,
}

impl From<bridge_traits::BridgeError> for CacheError {
    fn from(err: bridge_traits::BridgeError) -> Self {
        CacheError::Storage(err.to_string())
    }
}

/// Errors raised while fetching a byte range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connect failure, timeout, unexpected status or broken stream.
    #[error("Network error: {0}")]
    Network(String),

    /// The origin cannot serve the requested byte range.
    #[error("Range requests unsupported: {0}")]
    RangeUnsupported(String),

    /// The caller's cancellation token fired.
    #[error("Fetch cancelled")]
    Cancelled,

    /// The fetched bytes could not be stored.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl FetchError {
    /// Returns `true` if a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Network(_) | FetchError::Cache(CacheError::Storage(_))
        )
    }

    /// Returns `true` if retrying the same resource is pointless for the session.
    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchError::RangeUnsupported(_))
    }
}

/// Errors surfaced at the playback boundary.
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Index {index} is outside the playlist of {len} items")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if this error is due to network issues.
    pub fn is_network_error(&self) -> bool {
        matches!(self, PlaybackError::Fetch(FetchError::Network(_)))
    }

    /// Returns `true` if the operation was cancelled by its caller.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PlaybackError::Fetch(FetchError::Cancelled))
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_classification() {
        assert!(FetchError::Network("reset".into()).is_transient());
        assert!(!FetchError::Network("reset".into()).is_permanent());
        assert!(FetchError::RangeUnsupported("416".into()).is_permanent());
        assert!(!FetchError::RangeUnsupported("416".into()).is_transient());
        assert!(!FetchError::Cancelled.is_transient());
        assert!(!FetchError::Cache(CacheError::CapacityUnavailable {
            requested: 11,
            capacity: 10
        })
        .is_transient());
        assert!(FetchError::Cache(CacheError::Storage("disk".into())).is_transient());
    }

    #[test]
    fn test_playback_error_conversions() {
        let err: PlaybackError = FetchError::Cancelled.into();
        assert!(err.is_cancelled());

        let err: PlaybackError = FetchError::Network("timed out".into()).into();
        assert!(err.is_network_error());
        assert_eq!(err.to_string(), "Network error: timed out");

        let err = PlaybackError::IndexOutOfRange { index: 9, len: 3 };
        assert_eq!(err.to_string(), "Index 9 is outside the playlist of 3 items");
    }
}
