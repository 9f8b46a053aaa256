//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Name of the media cache directory below the platform cache dir.
const CACHE_DIR_NAME: &str = "MediaCache";

/// `FileSystemAccess` over `tokio::fs`, rooted at one cache directory.
pub struct TokioFileSystem {
    cache_dir: PathBuf,
}

impl TokioFileSystem {
    /// Use `<platform cache dir>/MediaCache`, falling back to the temp dir.
    pub fn new() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(CACHE_DIR_NAME);

        Self { cache_dir }
    }

    /// Use a caller-chosen cache directory
    pub fn with_cache_directory(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn get_cache_directory(&self) -> Result<PathBuf> {
        if !fs::try_exists(&self.cache_dir)
            .await
            .map_err(BridgeError::Io)?
        {
            fs::create_dir_all(&self.cache_dir)
                .await
                .map_err(BridgeError::Io)?;
            debug!(path = ?self.cache_dir, "Created cache directory");
        }
        Ok(self.cache_dir.clone())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(BridgeError::Io)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await.map_err(BridgeError::Io)?;

        Ok(FileMetadata {
            size: metadata.len(),
            modified_at: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(BridgeError::Io)
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(BridgeError::Io)?;
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent).await?;
        }

        fs::write(path, data.as_ref())
            .await
            .map_err(BridgeError::Io)?;
        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).await.map_err(BridgeError::Io)
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(BridgeError::Io)?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn delete_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
            .await
            .map_err(BridgeError::Io)?;
        debug!(path = ?path, "Deleted directory");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path).await.map_err(BridgeError::Io)?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(BridgeError::Io)?
        {
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_directory_name() {
        let fs = TokioFileSystem::new();
        assert!(fs.cache_dir.ends_with(CACHE_DIR_NAME));
    }

    #[tokio::test]
    async fn test_cache_directory_is_created() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("nested").join("MediaCache");
        let fs = TokioFileSystem::with_cache_directory(&root);

        let dir = fs.get_cache_directory().await.unwrap();
        assert_eq!(dir, root);
        assert!(fs.exists(&root).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_rename_read() {
        let temp = TempDir::new().unwrap();
        let fs = TokioFileSystem::with_cache_directory(temp.path());
        let tmp = temp.path().join("abc").join("0.1f2e.tmp");
        let dst = temp.path().join("abc").join("0.bin");

        fs.write_file(&tmp, Bytes::from_static(b"hello")).await.unwrap();
        fs.rename(&tmp, &dst).await.unwrap();

        assert!(!fs.exists(&tmp).await.unwrap());
        assert_eq!(fs.read_file(&dst).await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(fs.directory_size(temp.path()).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_delete_dir_all_and_missing_file() {
        let temp = TempDir::new().unwrap();
        let fs = TokioFileSystem::with_cache_directory(temp.path());
        let dir = temp.path().join("abc");
        fs.write_file(&dir.join("0.bin"), Bytes::from_static(b"x"))
            .await
            .unwrap();

        fs.delete_dir_all(&dir).await.unwrap();
        assert!(fs.list_directory(temp.path()).await.unwrap().is_empty());

        let err = fs.read_file(&dir.join("0.bin")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
