//! File System Abstraction
//!
//! The cache keeps every range as its own file below the host cache
//! directory; this trait is the only way the core touches disk.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Size and kind of a path.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    /// Unix seconds, when the platform reports it.
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// Sandboxed storage for cached ranges.
///
/// Paths are absolute and rooted at [`get_cache_directory`]. A missing path
/// is reported as [`BridgeError::Io`](crate::BridgeError::Io) with
/// `ErrorKind::NotFound` so callers can tell "already gone" from a failure.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn store(fs: &dyn FileSystemAccess, data: Bytes) -> Result<()> {
///     let dir = fs.get_cache_directory().await?;
///     let tmp = dir.join("range.bin.tmp");
///     fs.write_file(&tmp, data).await?;
///     fs.rename(&tmp, &dir.join("range.bin")).await
/// }
/// ```
///
/// [`get_cache_directory`]: FileSystemAccess::get_cache_directory
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Directory the host lets the core fill and reclaim.
    async fn get_cache_directory(&self) -> Result<PathBuf>;

    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create `path` and any missing parents; succeeds if it already exists.
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Replace the contents of `path`, creating parents as needed.
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Move `from` over `to` in one step; readers never see a partial `to`.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Remove `path` and everything below it.
    async fn delete_dir_all(&self, path: &Path) -> Result<()>;

    /// Immediate children of `path`.
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Total bytes of all files below `path`.
    async fn directory_size(&self, path: &Path) -> Result<u64> {
        let mut total = 0u64;
        let mut pending = vec![path.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in self.list_directory(&dir).await? {
                let metadata = self.metadata(&entry).await?;
                if metadata.is_directory {
                    pending.push(entry);
                } else {
                    total += metadata.size;
                }
            }
        }
        Ok(total)
    }
}
